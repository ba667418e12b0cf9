//! Integration tests for the runtime state as seen by an embedding: configuration limits,
//! globals and error recovery.

use luainterop::prelude::*;

fn recurse(state: &mut State) -> Result<usize> {
    state.get_global("recurse")?;
    state.call(0, 0)?;
    Ok(0)
}

#[test]
fn test_call_depth_limit_is_catchable() -> Result<()> {
    let mut state = State::with_config(InteropConfig::constrained());
    state.register_native("recurse", recurse)?;

    state.get_global("recurse")?;
    assert_eq!(state.pcall(0, 0)?, CallStatus::MemoryError);
    assert_eq!(state.read::<String>(-1)?, "stack overflow");
    assert_eq!(state.call_depth(), 0);
    assert_eq!(state.top(), 1);
    Ok(())
}

#[test]
fn test_stack_limit() {
    let mut state = State::with_config(InteropConfig::new().with_max_stack_depth(4));
    for i in 0..4 {
        state.push(i as f64).unwrap();
    }
    assert_eq!(state.push(5.0), Err(Error::StackOverflow));
    assert_eq!(state.top(), 4);
}

#[test]
fn test_globals_hold_host_values() -> Result<()> {
    let mut state = State::new();
    state.push("world")?;
    state.set_global("hello")?;
    state.push(HostValue::from(3.5))?;
    state.set_global("n")?;

    assert_eq!(state.get_global("hello")?, ValueKind::String);
    assert_eq!(state.get_global("n")?, ValueKind::Number);
    assert_eq!(state.get_global("absent")?, ValueKind::Nil);
    assert_eq!(state.read::<String>(1)?, "world");
    assert_eq!(state.read::<HostValue>(2)?, HostValue::Number(3.5));
    Ok(())
}

#[test]
fn test_policy_can_change_between_lookups() -> Result<()> {
    #[derive(Clone)]
    struct Empty;

    impl UserData for Empty {
        fn register(_: &mut BindingBuilder<Self>) {}
    }

    let mut state = State::new();
    state.new_instance(Empty)?;
    assert_eq!(state.get_field(-1, "missing")?, ValueKind::Nil);
    state.pop(1)?;

    state.set_missing_member_policy(MissingMemberPolicy::RaiseError);
    assert_eq!(
        state.get_field(-1, "missing"),
        Err(Error::MemberNotFound {
            member: "missing".to_string()
        })
    );
    Ok(())
}

#[test]
fn test_errors_from_nested_protected_calls() -> Result<()> {
    fn inner(_: &mut State) -> Result<usize> {
        Err(Error::Runtime {
            message: "inner failed".to_string(),
        })
    }

    fn outer(state: &mut State) -> Result<usize> {
        state.push_native("inner", inner)?;
        if state.pcall(0, 0)? != CallStatus::Ok {
            return Err(state.raise());
        }
        Ok(0)
    }

    let mut state = State::new();
    state.push_native("outer", outer)?;
    assert_eq!(state.pcall(0, 0)?, CallStatus::RuntimeError);
    assert_eq!(state.read::<String>(-1)?, "inner failed");
    Ok(())
}
