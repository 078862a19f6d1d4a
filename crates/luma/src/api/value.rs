// Host <-> guest value translation. HostValue is the owned, VM-independent
// shape the embedding API speaks; encode/decode map it onto interpreter
// values (lists become 1-based sequence tables, maps become keyed tables).

use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};

#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Map(Vec<(HostValue, HostValue)>),
}

impl HostValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            HostValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Encode a host value into the VM's value space.
pub fn encode(vm: &mut LuaVM, value: HostValue) -> LuaResult<LuaValue> {
    let encoded = match value {
        HostValue::Nil => LuaValue::Nil,
        HostValue::Bool(b) => LuaValue::Boolean(b),
        HostValue::Int(i) => LuaValue::Integer(i),
        HostValue::Float(f) => LuaValue::Float(f),
        HostValue::Str(s) => vm.create_string_value(s),
        HostValue::List(items) => {
            let table = vm.create_table();
            for (i, item) in items.into_iter().enumerate() {
                let lua_item = encode(vm, item)?;
                table.borrow_mut().raw_set_int(i as i64 + 1, lua_item);
            }
            LuaValue::Table(table)
        }
        HostValue::Map(entries) => {
            let table = vm.create_table();
            for (key, value) in entries {
                let lua_key = encode(vm, key)?;
                let lua_value = encode(vm, value)?;
                if lua_key.is_nil() {
                    return Err(vm.error("cannot encode a map entry with a nil key"));
                }
                table.borrow_mut().raw_set(lua_key, lua_value);
            }
            LuaValue::Table(table)
        }
    };
    Ok(encoded)
}

/// Decode a guest value for the host. Sequence-shaped tables (border equals
/// entry count) decode to lists, anything else to maps. Functions and
/// userdata have no host shape and fail.
pub fn decode(vm: &LuaVM, value: &LuaValue) -> LuaResult<HostValue> {
    decode_depth(vm, value, 0)
}

fn decode_depth(vm: &LuaVM, value: &LuaValue, depth: usize) -> LuaResult<HostValue> {
    if depth > 64 {
        return Err(vm.error("value too deep to decode"));
    }
    let decoded = match value {
        LuaValue::Nil => HostValue::Nil,
        LuaValue::Boolean(b) => HostValue::Bool(*b),
        LuaValue::Integer(i) => HostValue::Int(*i),
        LuaValue::Float(f) => HostValue::Float(*f),
        LuaValue::String(s) => HostValue::Str(s.as_str().to_string()),
        LuaValue::Table(t) => {
            let table = t.borrow();
            let border = table.border();
            if border as usize == table.entry_count() {
                let mut items = Vec::with_capacity(border as usize);
                for i in 1..=border {
                    items.push(decode_depth(vm, &table.raw_get_int(i), depth + 1)?);
                }
                HostValue::List(items)
            } else {
                let mut entries = Vec::with_capacity(table.entry_count());
                for (k, v) in table.iter_all() {
                    entries.push((
                        decode_depth(vm, &k, depth + 1)?,
                        decode_depth(vm, &v, depth + 1)?,
                    ));
                }
                HostValue::Map(entries)
            }
        }
        other => {
            return Err(vm.error(format!("cannot decode a {} value", other.type_name())));
        }
    };
    Ok(decoded)
}

pub fn decode_many(vm: &LuaVM, values: &[LuaValue]) -> LuaResult<Vec<HostValue>> {
    values.iter().map(|v| decode(vm, v)).collect()
}

pub fn encode_many(vm: &mut LuaVM, values: Vec<HostValue>) -> LuaResult<Vec<LuaValue>> {
    values.into_iter().map(|v| encode(vm, v)).collect()
}

pub(crate) fn multi_from_host(vm: &mut LuaVM, values: Vec<HostValue>) -> LuaResult<MultiValue> {
    Ok(MultiValue::multiple(encode_many(vm, values)?))
}
