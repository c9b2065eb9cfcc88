//! Polymorphic payload decoding.
//!
//! A union type is a closed Rust enum whose members are plain serde records.
//! Each union owns one [`UnionSpec`], built once on first use and read-only
//! afterwards. Decoding a JSON object runs:
//!
//! 1. Discriminator fast path. If the union names a discriminator field and the
//!    payload carries a registered value for it, decode strictly into that
//!    variant. A field mismatch there is final; no other variant is tried.
//! 2. Structural fallback. Try every fallback variant in registration order
//!    and keep the first one whose required fields are satisfied. Unknown
//!    fields are ignored.
//! 3. Catch-all, if the union registered one.
//! 4. An empty object decodes to `T::default()`.
//!
//! Only when all of that fails is an error produced, and the "unknown
//! discriminator" error is used only when a discriminator value was present.

use std::collections::HashMap;

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnionError {
    #[error("{union}: payload is not a JSON object")]
    NotAnObject { union: &'static str },

    #[error("{union}: payload does not fit variant `{variant}`: {source}")]
    Variant {
        union: &'static str,
        variant: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{union}: no variant matched the payload")]
    NoMatchingVariant { union: &'static str },

    #[error("{union}: was not able to find discriminated union variant for {value}")]
    UnknownDiscriminator { union: &'static str, value: String },
}

type DecodeFn<T> = Box<dyn Fn(&Value) -> Result<T, serde_json::Error> + Send + Sync>;

struct Variant<T> {
    name: &'static str,
    decode: DecodeFn<T>,
}

/// Read-only description of one union type.
pub struct UnionSpec<T> {
    name: &'static str,
    discriminator: Option<&'static str>,
    variants: Vec<Variant<T>>,
    by_tag: HashMap<&'static str, usize>,
    fallback: Vec<usize>,
    catch_all: Option<fn(Value) -> T>,
}

/// Implemented by every union enum. `Default` is the value an empty object
/// decodes to.
pub trait Polymorphic: Default + Sized + 'static {
    fn union_spec() -> &'static UnionSpec<Self>;
}

/// Serde entry point for union types; use it from a manual `Deserialize` impl.
pub fn deserialize_union<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Polymorphic,
{
    let value = Value::deserialize(deserializer)?;
    T::union_spec().decode(&value).map_err(D::Error::custom)
}

fn short_type_name<V>() -> &'static str {
    let full = std::any::type_name::<V>();
    full.rsplit("::").next().unwrap_or(full)
}

impl<T: Default + 'static> UnionSpec<T> {
    /// Start a union discriminated by `field`.
    pub fn tagged(name: &'static str, field: &'static str) -> UnionBuilder<T> {
        UnionBuilder {
            spec: Self::empty(name, Some(field)),
        }
    }

    /// Start a union with no discriminator; only structural fallback applies.
    pub fn untagged(name: &'static str) -> UnionBuilder<T> {
        UnionBuilder {
            spec: Self::empty(name, None),
        }
    }

    fn empty(name: &'static str, discriminator: Option<&'static str>) -> Self {
        Self {
            name,
            discriminator,
            variants: Vec::new(),
            by_tag: HashMap::new(),
            fallback: Vec::new(),
            catch_all: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn discriminator(&self) -> Option<&'static str> {
        self.discriminator
    }

    /// Variants tried by structural fallback, in order.
    pub fn fallback_variants(&self) -> Vec<&'static str> {
        self.fallback.iter().map(|&i| self.variants[i].name).collect()
    }

    /// Variant selected by a discriminator value, if registered.
    pub fn variant_for_tag(&self, tag: &str) -> Option<&'static str> {
        self.by_tag.get(tag).map(|&i| self.variants[i].name)
    }

    pub fn decode(&self, value: &Value) -> Result<T, UnionError> {
        let map = value.as_object().ok_or(UnionError::NotAnObject { union: self.name })?;

        let mut unknown_tag = None;
        if let Some(field) = self.discriminator
            && let Some(tag) = map.get(field)
        {
            let hit = tag.as_str().and_then(|t| self.by_tag.get(t));
            match hit {
                Some(&i) => {
                    let variant = &self.variants[i];
                    return (variant.decode)(value).map_err(|source| UnionError::Variant {
                        union: self.name,
                        variant: variant.name,
                        source,
                    });
                }
                None => unknown_tag = Some(tag.to_string()),
            }
        }

        for &i in &self.fallback {
            if let Ok(decoded) = (self.variants[i].decode)(value) {
                return Ok(decoded);
            }
        }

        if let Some(catch_all) = self.catch_all {
            return Ok(catch_all(value.clone()));
        }
        if map.is_empty() {
            return Ok(T::default());
        }

        match unknown_tag {
            Some(value) => Err(UnionError::UnknownDiscriminator {
                union: self.name,
                value,
            }),
            None => Err(UnionError::NoMatchingVariant { union: self.name }),
        }
    }
}

pub struct UnionBuilder<T> {
    spec: UnionSpec<T>,
}

impl<T: Default + 'static> UnionBuilder<T> {
    fn push<V: DeserializeOwned + 'static>(&mut self, wrap: fn(V) -> T) -> usize {
        let decode: DecodeFn<T> = Box::new(move |value: &Value| V::deserialize(value).map(wrap));
        self.spec.variants.push(Variant {
            name: short_type_name::<V>(),
            decode,
        });
        self.spec.variants.len() - 1
    }

    /// Selected by `tag` and also tried during structural fallback.
    pub fn variant<V: DeserializeOwned + 'static>(mut self, tag: &'static str, wrap: fn(V) -> T) -> Self {
        let i = self.push(wrap);
        self.spec.by_tag.insert(tag, i);
        self.spec.fallback.push(i);
        self
    }

    /// Selected by `tag` only; never matched structurally.
    pub fn exact<V: DeserializeOwned + 'static>(mut self, tag: &'static str, wrap: fn(V) -> T) -> Self {
        let i = self.push(wrap);
        self.spec.by_tag.insert(tag, i);
        self
    }

    /// Matched structurally only; has no discriminator value.
    pub fn shape<V: DeserializeOwned + 'static>(mut self, wrap: fn(V) -> T) -> Self {
        let i = self.push(wrap);
        self.spec.fallback.push(i);
        self
    }

    pub fn catch_all(mut self, wrap: fn(Value) -> T) -> Self {
        self.spec.catch_all = Some(wrap);
        self
    }

    pub fn build(self) -> UnionSpec<T> {
        self.spec
    }
}
