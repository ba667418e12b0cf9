//! Protocol implementations for `()` and tuples.

use crate::{
    marshal::{FromStack, FromStackMulti, IntoStack, IntoStackMulti},
    runtime::State,
    Result,
};

impl IntoStackMulti for () {
    const COUNT: usize = 0;

    fn push_all(self, _: &mut State) -> Result<usize> {
        Ok(0)
    }
}

impl FromStackMulti for () {
    const COUNT: usize = 0;
    const FIRST_ACCEPTS_USERDATA: bool = false;

    fn from_top(_: &State) -> Result<Self> {
        Ok(())
    }
}

macro_rules! count {
    () => { 0 };
    ($head:ident $($tail:ident)*) => { 1 + count!($($tail)*) };
}

macro_rules! first {
    ($head:ident $($tail:ident)*) => { $head };
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: IntoStack),+> IntoStackMulti for ($($name,)+) {
            const COUNT: usize = count!($($name)+);

            #[allow(non_snake_case)]
            fn push_all(self, state: &mut State) -> Result<usize> {
                let ($($name,)+) = self;
                $( state.push($name)?; )+
                Ok(Self::COUNT)
            }
        }

        impl<$($name: FromStack),+> FromStackMulti for ($($name,)+) {
            const COUNT: usize = count!($($name)+);
            const FIRST_ACCEPTS_USERDATA: bool = <first!($($name)+) as FromStack>::ACCEPTS_USERDATA;

            #[allow(non_snake_case, unused_assignments)]
            fn from_top(state: &State) -> Result<Self> {
                let mut index = -(Self::COUNT as i32);
                $(
                    let $name = $name::from_stack(state, index)?;
                    index += 1;
                )+
                Ok(($($name,)+))
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
impl_tuple!(A, B, C, D, E);
impl_tuple!(A, B, C, D, E, F);
impl_tuple!(A, B, C, D, E, F, G);
impl_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_reads_in_declared_order() {
        let mut state = State::new();
        state.push(1.0).unwrap();
        state.push(2.0).unwrap();
        state.push(-2.5).unwrap();
        let (a, b, c) = <(f64, f64, f64)>::from_top(&state).unwrap();
        assert_eq!((a, b, c), (1.0, 2.0, -2.5));
        assert_eq!(state.top(), 3);
    }

    #[test]
    fn test_single_element_tuple() {
        let mut state = State::new();
        assert_eq!(("only",).push_all(&mut state).unwrap(), 1);
        let (s,) = <(String,)>::from_top(&state).unwrap();
        assert_eq!(s, "only");
    }

    #[test]
    fn test_tuple_read_error() {
        let mut state = State::new();
        state.push(1.0).unwrap();
        state.push(true).unwrap();
        assert!(<(f64, f64)>::from_top(&state).is_err());
    }

    #[test]
    fn test_counts() {
        assert_eq!(<() as IntoStackMulti>::COUNT, 0);
        assert_eq!(<(f64, f64, f64, f64) as IntoStackMulti>::COUNT, 4);
        assert_eq!(<(f64, f64, f64, f64, f64, f64, f64, f64) as FromStackMulti>::COUNT, 8);
    }
}
