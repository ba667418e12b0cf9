//! Metatable hooks of reflected types.
//!
//! Each reflected type gets one metatable per state. Its `__index`, `__newindex` and operator
//! entries are native closures sharing the type's [`ReflectedBinding`]:
//!
//! ```text
//! obj.key          -> __index     fields, then methods (curried), then missing-member policy
//! obj.key = value  -> __newindex  writable fields, then missing-member policy
//! a + b, -a, #a    -> __add, ...  both operands unwrapped as the bound type
//! ```

use std::{rc::Rc, sync::Arc};

use crate::{
    config::MissingMemberPolicy,
    function::BoundCallable,
    runtime::{Metamethod, State, Table, TableRef, Value},
    userdata::{MethodKind, ReflectedBinding, Userdata},
    Error, Result,
};

/// Returns the metatable of `binding` in `state`, installing it on first use.
pub(crate) fn install(state: &mut State, binding: &Arc<ReflectedBinding>) -> Result<TableRef> {
    let id = binding.tag().id();
    if let Some(metatable) = state.type_metatable(id) {
        return Ok(metatable);
    }

    let events: Vec<Metamethod> = binding.operators().map(|op| op.event()).collect();
    let metatable = TableRef::new(Table::with_capacity(0, 3 + events.len()));
    {
        let mut meta = metatable.borrow_mut();
        meta.set_str(Metamethod::Name.name(), Value::string(binding.name()));

        let shared = binding.clone();
        meta.set_str(
            Metamethod::Index.name(),
            hook(binding, Metamethod::Index, move |state| index(state, &shared)),
        );
        let shared = binding.clone();
        meta.set_str(
            Metamethod::NewIndex.name(),
            hook(binding, Metamethod::NewIndex, move |state| {
                newindex(state, &shared)
            }),
        );
        for event in events.iter().copied() {
            let shared = binding.clone();
            meta.set_str(
                event.name(),
                hook(binding, event, move |state| operator(state, &shared, event)),
            );
        }
    }

    state
        .registry()
        .borrow_mut()
        .set_str(binding.name(), Value::Table(metatable.clone()));
    state.insert_type_metatable(id, metatable.clone());
    log::debug!(
        "installed metatable for '{}' with {} operator(s)",
        binding.name(),
        events.len()
    );
    Ok(metatable)
}

fn hook<F>(binding: &ReflectedBinding, event: Metamethod, f: F) -> Value
where
    F: Fn(&mut State) -> Result<usize> + 'static,
{
    let name = format!("{}.{}", binding.name(), event);
    Value::Function(Rc::new(BoundCallable::from_closure(&name, f)))
}

/// Resolves the instance at `index` as a userdata of the bound type.
fn instance(state: &State, binding: &ReflectedBinding, index: i32) -> Result<Rc<Userdata>> {
    match state.value(index)? {
        Value::Userdata(ud) if ud.tag() == binding.tag() => Ok(ud),
        Value::Userdata(ud) => Err(Error::UserdataTypeMismatch {
            expected: binding.name().to_string(),
            found: ud.type_name().to_string(),
        }),
        other => Err(Error::UserdataTypeMismatch {
            expected: binding.name().to_string(),
            found: other.kind().to_string(),
        }),
    }
}

fn reject(state: &State, err: Error) -> Result<usize> {
    match state.missing_member_policy() {
        MissingMemberPolicy::ReturnNil => Ok(0),
        MissingMemberPolicy::RaiseError => Err(err),
    }
}

fn index(state: &mut State, binding: &Arc<ReflectedBinding>) -> Result<usize> {
    let instance = instance(state, binding, 1)?;
    let key = state.value(2)?;
    let Some(name) = key.as_str() else {
        return missing_read(state, key.to_string());
    };

    if let Some(getter) = binding.field(name).and_then(|field| field.getter.as_ref()) {
        let value = getter(state, &instance)?;
        state.push_value(value)?;
        return Ok(1);
    }

    if let Some(method) = binding.method_index(name) {
        let curried = curry(binding.clone(), method, instance)?;
        state.push_value(Value::Function(Rc::new(curried)))?;
        return Ok(1);
    }

    missing_read(state, name.to_string())
}

fn missing_read(state: &mut State, member: String) -> Result<usize> {
    match state.missing_member_policy() {
        MissingMemberPolicy::ReturnNil => {
            state.push_nil()?;
            Ok(1)
        }
        MissingMemberPolicy::RaiseError => Err(Error::MemberNotFound { member }),
    }
}

fn newindex(state: &mut State, binding: &Arc<ReflectedBinding>) -> Result<usize> {
    let instance = instance(state, binding, 1)?;
    let key = state.value(2)?;
    let value = state.value(3)?;
    let Some(name) = key.as_str() else {
        return reject(
            state,
            Error::MemberNotFound {
                member: key.to_string(),
            },
        );
    };

    match binding.field(name) {
        Some(field) => match &field.setter {
            Some(setter) => {
                setter(state, &instance, value)?;
                Ok(0)
            }
            None => reject(
                state,
                Error::ReadOnlyMember {
                    member: name.to_string(),
                    type_name: binding.name().to_string(),
                },
            ),
        },
        None => reject(
            state,
            Error::MemberNotFound {
                member: name.to_string(),
            },
        ),
    }
}

/// Builds the callable returned for `obj.method`, bound to `instance`.
///
/// Both `obj.method(args)` and `obj:method(args)` are accepted. A leading argument that is
/// this instance is taken as the receiver and dropped when the call carries one argument
/// more than the method declares, or when the first declared argument cannot take a
/// userdata. Trailing optional arguments may therefore be left out in either form.
fn curry(
    binding: Arc<ReflectedBinding>,
    method: usize,
    instance: Rc<Userdata>,
) -> Result<BoundCallable> {
    let name = match binding.methods().get(method) {
        Some(m) => format!("{}.{}", binding.name(), m.name()),
        None => return Err(runtime_error!("no method #{} in {}", method, binding.name())),
    };

    Ok(BoundCallable::from_closure(&name, move |state| {
        let Some(method) = binding.methods().get(method) else {
            return Err(runtime_error!("no method #{} in {}", method, binding.name()));
        };
        let top = state.top() as usize;
        if top > 0 && (top == method.arity() + 1 || !method.first_accepts_userdata()) {
            if let Value::Userdata(first) = state.value(1)? {
                if Rc::ptr_eq(&first, &instance) {
                    state.remove(1)?;
                }
            }
        }
        let receiver = match method.kind() {
            MethodKind::Function => None,
            MethodKind::Receiver | MethodKind::MutReceiver => Some(&*instance),
        };
        (method.call)(state, receiver)
    }))
}

fn operator(state: &mut State, binding: &Arc<ReflectedBinding>, event: Metamethod) -> Result<usize> {
    let Some(overload) = binding.operator(event) else {
        return Err(runtime_error!(
            "no '{}' overload in {}",
            event,
            binding.name()
        ));
    };
    let left = instance(state, binding, 1)?;
    let right = if event.is_unary_operator() {
        left.clone()
    } else {
        instance(state, binding, 2)?
    };
    let result = (overload.call)(state, &left, &right)?;
    state.push_value(result)?;
    Ok(1)
}
