//! Live enumeration of table entries over the stack.

use crate::{
    runtime::{State, Value},
    Result,
};

/// Iterator over the key/value pairs of a table.
///
/// Created by [`ContainerView::iter`](super::ContainerView::iter). While it lives, the table
/// occupies one extra slot on the stack; every step pushes the next pair, reads it and pops it
/// again, so the depth seen between steps never changes. The slot is released on drop.
///
/// Assigning nil to the current key is allowed during traversal; adding keys is not.
pub struct Pairs<'s> {
    state: &'s mut State,
    base: i32,
    table: i32,
    key: Option<Value>,
}

impl<'s> Pairs<'s> {
    pub(crate) fn new(state: &'s mut State, table: Value) -> Result<Self> {
        let base = state.top();
        state.push_value(table)?;
        Ok(Pairs {
            state,
            base,
            table: base + 1,
            key: Some(Value::Nil),
        })
    }

    fn step(&mut self, key: Value) -> Result<Option<(Value, Value)>> {
        self.state.push_value(key)?;
        if !self.state.next(self.table)? {
            return Ok(None);
        }
        let key = self.state.value(-2)?;
        let value = self.state.value(-1)?;
        self.state.pop(2)?;
        Ok(Some((key, value)))
    }
}

impl Iterator for Pairs<'_> {
    type Item = Result<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.key.take()?;
        match self.step(key) {
            Ok(Some((key, value))) => {
                self.key = Some(key.clone());
                Some(Ok((key, value)))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for Pairs<'_> {
    fn drop(&mut self) {
        if self.state.top() > self.base {
            // never fails: base is inside the current frame
            let _ = self.state.set_top(self.base);
        }
    }
}

/// Visits every pair of the table `table` with the pair exposed at `-2`/`-1`.
pub(crate) fn walk<F>(state: &mut State, table: Value, mut f: F) -> Result<()>
where
    F: FnMut(&mut State) -> Result<()>,
{
    let base = state.top();
    let outcome = walk_pairs(state, table, &mut f);
    state.set_top(base)?;
    outcome
}

fn walk_pairs<F>(state: &mut State, table: Value, f: &mut F) -> Result<()>
where
    F: FnMut(&mut State) -> Result<()>,
{
    state.push_value(table)?;
    let table = state.top();
    state.push_nil()?;
    while state.next(table)? {
        let depth = state.top();
        f(state)?;
        assert_eq!(
            state.top(),
            depth,
            "table walk callback changed the stack depth"
        );
        state.pop(1)?;
    }
    Ok(())
}
