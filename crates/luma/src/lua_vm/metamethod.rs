// Metamethod dispatch: __index / __newindex chains with cycle limits,
// __call resolution, __tostring, and the protected-metatable rules.

use super::{LuaResult, LuaVM};
use crate::lua_value::{LuaTable, LuaValue};
use std::cell::RefCell;
use std::rc::Rc;

/// Longest `__index`/`__newindex` chain followed before assuming a cycle.
const META_CHAIN_LIMIT: usize = 100;

impl LuaVM {
    /// The metatable of any value: tables and userdata carry their own,
    /// strings share the string metatable.
    pub fn metatable_of(&self, v: &LuaValue) -> Option<Rc<RefCell<LuaTable>>> {
        match v {
            LuaValue::Table(t) => t.borrow().metatable(),
            LuaValue::Userdata(u) => u.metatable(),
            LuaValue::String(_) => self.string_metatable(),
            _ => None,
        }
    }

    /// Non-nil metamethod entry for `event`, if any.
    pub fn get_metamethod(&self, v: &LuaValue, event: &str) -> Option<LuaValue> {
        let meta = self.metatable_of(v)?;
        let handler = meta.borrow().raw_get_str(event);
        if handler.is_nil() { None } else { Some(handler) }
    }

    /// Call a binary metamethod from either operand; Ok(None) when neither
    /// side defines it.
    pub(super) fn try_binary_metamethod(
        &mut self,
        event: &str,
        lhs: &LuaValue,
        rhs: &LuaValue,
    ) -> LuaResult<Option<LuaValue>> {
        let handler = self
            .get_metamethod(lhs, event)
            .or_else(|| self.get_metamethod(rhs, event));
        match handler {
            Some(h) => {
                let result = self.call_value_single(h, vec![lhs.clone(), rhs.clone()])?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// `container[key]` with the full `__index` chain.
    pub fn index_value(&mut self, container: &LuaValue, key: &LuaValue) -> LuaResult<LuaValue> {
        let mut current = container.clone();
        for _ in 0..META_CHAIN_LIMIT {
            if let LuaValue::Table(t) = &current {
                let raw = t.borrow().raw_get(key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
                match self.get_metamethod(&current, "__index") {
                    None => return Ok(LuaValue::Nil),
                    Some(LuaValue::Table(next)) => {
                        current = LuaValue::Table(next);
                        continue;
                    }
                    Some(handler) if handler.is_callable() => {
                        return self
                            .call_value_single(handler, vec![current.clone(), key.clone()]);
                    }
                    Some(other) => {
                        current = other;
                        continue;
                    }
                }
            }

            // Non-table: only an __index metamethod can make this work.
            match self.get_metamethod(&current, "__index") {
                Some(LuaValue::Table(next)) => {
                    current = LuaValue::Table(next);
                }
                Some(handler) if handler.is_callable() => {
                    return self.call_value_single(handler, vec![current.clone(), key.clone()]);
                }
                _ => {
                    return Err(self.error(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )));
                }
            }
        }
        Err(self.error("'__index' chain too long; possible loop"))
    }

    /// `container[key] = value` with the `__newindex` chain.
    pub fn newindex_value(
        &mut self,
        container: &LuaValue,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<()> {
        let mut current = container.clone();
        for _ in 0..META_CHAIN_LIMIT {
            if let LuaValue::Table(t) = &current {
                let present = !t.borrow().raw_get(&key).is_nil();
                if present {
                    t.borrow_mut().raw_set(key, value);
                    return Ok(());
                }
                match self.get_metamethod(&current, "__newindex") {
                    None => {
                        self.check_table_key(&key)?;
                        t.borrow_mut().raw_set(key, value);
                        return Ok(());
                    }
                    Some(LuaValue::Table(next)) => {
                        current = LuaValue::Table(next);
                        continue;
                    }
                    Some(handler) if handler.is_callable() => {
                        self.call_value(handler, vec![current.clone(), key, value])?;
                        return Ok(());
                    }
                    Some(other) => {
                        current = other;
                        continue;
                    }
                }
            }

            match self.get_metamethod(&current, "__newindex") {
                Some(LuaValue::Table(next)) => current = LuaValue::Table(next),
                Some(handler) if handler.is_callable() => {
                    self.call_value(handler, vec![current.clone(), key, value])?;
                    return Ok(());
                }
                _ => {
                    return Err(self.error(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )));
                }
            }
        }
        Err(self.error("'__newindex' chain too long; possible loop"))
    }

    /// Keys a raw table store will accept.
    pub fn check_table_key(&self, key: &LuaValue) -> LuaResult<()> {
        match key {
            LuaValue::Nil => Err(self.error("table index is nil")),
            LuaValue::Float(f) if f.is_nan() => Err(self.error("table index is NaN")),
            _ => Ok(()),
        }
    }

    /// `tostring(v)`: `__tostring` wins and must return a string; otherwise
    /// the default "<type>: <identity>" form.
    pub fn tostring_value(&mut self, v: &LuaValue) -> LuaResult<String> {
        if let Some(handler) = self.get_metamethod(v, "__tostring") {
            let result = self.call_value_single(handler, vec![v.clone()])?;
            return match result {
                LuaValue::String(s) => Ok(s.as_str().to_string()),
                other => Err(self.error(format!(
                    "'__tostring' must return a string (got {})",
                    other.type_name()
                ))),
            };
        }
        Ok(v.to_display_string())
    }

    /// `setmetatable` semantics: refuses when the current metatable is
    /// protected with `__metatable`.
    pub fn set_metatable_checked(
        &mut self,
        table: &LuaValue,
        new_meta: Option<Rc<RefCell<LuaTable>>>,
    ) -> LuaResult<()> {
        let LuaValue::Table(t) = table else {
            return Err(self.error(format!(
                "bad argument #1 to 'setmetatable' (table expected, got {})",
                table.type_name()
            )));
        };
        let protected = t
            .borrow()
            .metatable()
            .map(|m| !m.borrow().raw_get_str("__metatable").is_nil())
            .unwrap_or(false);
        if protected {
            return Err(self.error("cannot change a protected metatable"));
        }
        t.borrow_mut().set_metatable(new_meta);
        Ok(())
    }

    /// `getmetatable` semantics: a `__metatable` entry shadows the real
    /// metatable.
    pub fn get_metatable_checked(&self, v: &LuaValue) -> LuaValue {
        match self.metatable_of(v) {
            None => LuaValue::Nil,
            Some(meta) => {
                let sentinel = meta.borrow().raw_get_str("__metatable");
                if sentinel.is_nil() {
                    LuaValue::Table(meta)
                } else {
                    sentinel
                }
            }
        }
    }

    /// Raw `next` for `pairs`/`next`.
    pub fn next_value(
        &self,
        table: &LuaValue,
        key: &LuaValue,
    ) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        let LuaValue::Table(t) = table else {
            return Err(self.error(format!(
                "bad argument #1 to 'next' (table expected, got {})",
                table.type_name()
            )));
        };
        let probe = if key.is_nil() { None } else { Some(key) };
        Ok(t.borrow().next(probe))
    }
}
