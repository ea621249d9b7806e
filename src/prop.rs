//! Closed variant types for declaration-time properties.
//!
//! A property is a literal, a named reference resolved against the parsing
//! context, or a computation over the context. Resolution is a pattern
//! match; no runtime type inspection is involved.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::CodecError;
use crate::value::Value;

/// A computation over the context, shared read-only across calls.
pub type ComputeFn = Arc<dyn Fn(&Context) -> Result<Value, CodecError> + Send + Sync>;

/// A write-time override computation: receives the context and the value
/// that would otherwise be written.
pub type OverrideFn = Arc<dyn Fn(&Context, Value) -> Result<Value, CodecError> + Send + Sync>;

/// A declaration-time property. Reference paths may be dotted
/// (`"header.len"` descends into a resolved nested value) and may start
/// with `^.` to address the parent context.
#[derive(Clone)]
pub enum Prop {
    Literal(Value),
    Reference(String),
    Computed(ComputeFn),
}

impl Prop {
    pub fn literal(value: impl Into<Value>) -> Self {
        Prop::Literal(value.into())
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Prop::Reference(path.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        Prop::Computed(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &Context) -> Result<Value, CodecError> {
        match self {
            Prop::Literal(v) => Ok(v.clone()),
            Prop::Reference(path) => ctx.lookup(path).cloned(),
            Prop::Computed(f) => f(ctx),
        }
    }

    /// Resolves to a signed count or length; `what` names the property in
    /// the error message.
    pub fn resolve_i64(&self, ctx: &Context, what: &str) -> Result<i64, CodecError> {
        let value = self.resolve(ctx)?;
        value
            .as_i64()
            .ok_or_else(|| CodecError::Parse(format!("{}: expected a numeric value, got {:?}", what, value)))
    }

    /// The literal value, when the property does not depend on context.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Prop::Literal(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Prop::Reference(path) => f.debug_tuple("Reference").field(path).finish(),
            Prop::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A field default, evaluated at construction time. Unlike lengths and
/// discriminants, defaults are never named references: a bare string is a
/// value, not a lookup.
#[derive(Clone)]
pub enum FieldDefault {
    Literal(Value),
    Computed(ComputeFn),
}

impl FieldDefault {
    pub fn resolve(&self, ctx: &Context) -> Result<Value, CodecError> {
        match self {
            FieldDefault::Literal(v) => Ok(v.clone()),
            FieldDefault::Computed(f) => f(ctx),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            FieldDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A write-time override. When configured it unconditionally replaces the
/// value passed to `write`.
#[derive(Clone)]
pub enum OverrideSpec {
    Literal(Value),
    Computed(OverrideFn),
}

impl OverrideSpec {
    pub fn apply(&self, ctx: &Context, value: Value) -> Result<Value, CodecError> {
        match self {
            OverrideSpec::Literal(v) => Ok(v.clone()),
            OverrideSpec::Computed(f) => f(ctx, value),
        }
    }
}

impl fmt::Debug for OverrideSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideSpec::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            OverrideSpec::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}
