//! Cartesian-product iteration over the range sources of a file template.
//!
//! Each level binds `k{depth}`/`v{depth}` into the evaluation data while its
//! subtree runs and removes both once it is done.

use minijinja::value::ValueKind;
use minijinja::Value;

use crate::context::EvalData;
use crate::error::{Error, Result};
use crate::field_map::OrderedFieldMap;

/// One iteration source.
#[derive(Debug, Clone)]
pub enum RangeSource {
    /// `(key, value)` in declaration order
    FieldMap(OrderedFieldMap),
    /// `(index, element)`
    Sequence(Vec<Value>),
    /// `(key, value)` in the collection's own order. Serialized structs land
    /// here and keep their field declaration order.
    Map(Vec<(Value, Value)>),
}

impl RangeSource {
    /// Classifies an expression value. Returns `None` for shapes that cannot
    /// be iterated (scalars, none, undefined).
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(map) = value.downcast_object_ref::<OrderedFieldMap>() {
            return Some(RangeSource::FieldMap(map.clone()));
        }
        match value.kind() {
            ValueKind::Seq | ValueKind::Iterable => {
                Some(RangeSource::Sequence(value.try_iter().ok()?.collect()))
            }
            ValueKind::Map => {
                let mut pairs = Vec::new();
                for key in value.try_iter().ok()? {
                    let item = value.get_item(&key).ok()?;
                    pairs.push((key, item));
                }
                Some(RangeSource::Map(pairs))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RangeSource::FieldMap(map) => map.len(),
            RangeSource::Sequence(items) => items.len(),
            RangeSource::Map(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `each` with every `(key, value)` pair in order.
    pub fn for_each<F>(&self, mut each: F) -> Result<()>
    where
        F: FnMut(Value, Value) -> Result<()>,
    {
        match self {
            RangeSource::FieldMap(map) => {
                for (key, value) in map.iter() {
                    each(Value::from(key.as_str()), Value::from(value))?;
                }
            }
            RangeSource::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    each(Value::from(index), item.clone())?;
                }
            }
            RangeSource::Map(pairs) => {
                for (key, value) in pairs {
                    each(key.clone(), value.clone())?;
                }
            }
        }
        Ok(())
    }
}

/// Converts the values registered through `pathRange` into sources.
pub fn sources_from_values(values: &[Value]) -> Result<Vec<RangeSource>> {
    values
        .iter()
        .enumerate()
        .map(|(position, value)| {
            RangeSource::from_value(value).ok_or_else(|| {
                Error::RangeError(format!(
                    "range source unsupported at position {position}: {} cannot be iterated",
                    value.kind()
                ))
            })
        })
        .collect()
}

/// Invokes `on_combination` once per element of the cartesian product of
/// `sources`. With no sources it is invoked exactly once.
///
/// An empty source aborts the whole iteration; combinations already handled
/// are not undone.
pub fn iterate<F>(
    sources: &[RangeSource],
    data: &mut EvalData,
    on_combination: &mut F,
    depth: usize,
) -> Result<()>
where
    F: FnMut(&mut EvalData) -> Result<()>,
{
    let Some((source, rest)) = sources.split_first() else {
        return on_combination(data);
    };

    if source.is_empty() {
        return Err(Error::RangeError(format!("range source empty at position {depth}")));
    }

    let key_name = format!("k{depth}");
    let value_name = format!("v{depth}");

    let result = source.for_each(|key, value| {
        data.bind(key_name.as_str(), key);
        data.bind(value_name.as_str(), value);
        iterate(rest, data, on_combination, depth + 1)
    });

    data.unbind(&key_name);
    data.unbind(&value_name);
    result
}
