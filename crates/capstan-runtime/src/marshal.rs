//! Bidirectional marshalling between native values and runtime [`Val`]s.
//!
//! Conversion is recursive: sequences convert element-wise and nest to any
//! depth, terminating at the scalar/text/boolean base cases. The outbound
//! direction is total over the implemented types; anything else is a
//! compile error. The inbound direction never fails: a value of the wrong
//! shape extracts as the target type's default.

use wasmtime::component::Val;

/// Native → runtime conversion.
///
/// Implemented for the closed set of bridge types: floats, booleans,
/// integers, chars, text, and nested sequences of those.
pub trait ToDynamic {
    fn to_dynamic(&self) -> Val;
}

/// Runtime → native conversion.
///
/// Numeric extraction truncates toward zero and saturates at the target
/// type's bounds; mismatched shapes extract as the default value.
pub trait FromDynamic: Sized {
    fn from_dynamic(val: &Val) -> Self;
}

/// Convert a native value into a runtime value.
pub fn to_dynamic<T: ToDynamic + ?Sized>(value: &T) -> Val {
    value.to_dynamic()
}

/// Extract a native value from a runtime value.
pub fn from_dynamic<T: FromDynamic>(val: &Val) -> T {
    T::from_dynamic(val)
}

/// Build a positional runtime argument vector from a heterogeneous list of
/// native values, converting each with [`ToDynamic`] left to right.
///
/// ```
/// use capstan_runtime::dynamic_args;
///
/// let args = dynamic_args![vec![1i64, 2, 3], 3.14, true, "testing"];
/// assert_eq!(args.len(), 4);
/// ```
#[macro_export]
macro_rules! dynamic_args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::marshal::ToDynamic::to_dynamic(&$arg)),*]
    };
}

impl ToDynamic for bool {
    fn to_dynamic(&self) -> Val {
        Val::Bool(*self)
    }
}

impl ToDynamic for i32 {
    fn to_dynamic(&self) -> Val {
        Val::S32(*self)
    }
}

impl ToDynamic for i64 {
    fn to_dynamic(&self) -> Val {
        Val::S64(*self)
    }
}

impl ToDynamic for f32 {
    fn to_dynamic(&self) -> Val {
        Val::Float32(*self)
    }
}

impl ToDynamic for f64 {
    fn to_dynamic(&self) -> Val {
        Val::Float64(*self)
    }
}

impl ToDynamic for char {
    fn to_dynamic(&self) -> Val {
        Val::Char(*self)
    }
}

impl ToDynamic for str {
    fn to_dynamic(&self) -> Val {
        Val::String(self.to_owned())
    }
}

impl ToDynamic for String {
    fn to_dynamic(&self) -> Val {
        Val::String(self.clone())
    }
}

impl<T: ToDynamic> ToDynamic for [T] {
    fn to_dynamic(&self) -> Val {
        Val::List(self.iter().map(ToDynamic::to_dynamic).collect())
    }
}

impl<T: ToDynamic> ToDynamic for Vec<T> {
    fn to_dynamic(&self) -> Val {
        self.as_slice().to_dynamic()
    }
}

impl<T: ToDynamic + ?Sized> ToDynamic for &T {
    fn to_dynamic(&self) -> Val {
        (**self).to_dynamic()
    }
}

/// Widen any numeric or boolean val to `f64`.
fn as_f64(val: &Val) -> Option<f64> {
    Some(match val {
        Val::Float64(v) => *v,
        Val::Float32(v) => f64::from(*v),
        Val::S64(v) => *v as f64,
        Val::U64(v) => *v as f64,
        Val::S32(v) => f64::from(*v),
        Val::U32(v) => f64::from(*v),
        Val::S16(v) => f64::from(*v),
        Val::U16(v) => f64::from(*v),
        Val::S8(v) => f64::from(*v),
        Val::U8(v) => f64::from(*v),
        Val::Bool(v) => f64::from(u8::from(*v)),
        _ => return None,
    })
}

/// Widen any numeric or boolean val to `i64`, truncating floats toward
/// zero and saturating out-of-range magnitudes.
fn as_i64(val: &Val) -> Option<i64> {
    Some(match val {
        Val::S64(v) => *v,
        Val::U64(v) => i64::try_from(*v).unwrap_or(i64::MAX),
        Val::S32(v) => i64::from(*v),
        Val::U32(v) => i64::from(*v),
        Val::S16(v) => i64::from(*v),
        Val::U16(v) => i64::from(*v),
        Val::S8(v) => i64::from(*v),
        Val::U8(v) => i64::from(*v),
        Val::Float64(v) => *v as i64,
        Val::Float32(v) => *v as i64,
        Val::Bool(v) => i64::from(*v),
        _ => return None,
    })
}

impl FromDynamic for f64 {
    fn from_dynamic(val: &Val) -> Self {
        as_f64(val).unwrap_or_default()
    }
}

impl FromDynamic for f32 {
    fn from_dynamic(val: &Val) -> Self {
        as_f64(val).unwrap_or_default() as f32
    }
}

impl FromDynamic for i64 {
    fn from_dynamic(val: &Val) -> Self {
        as_i64(val).unwrap_or_default()
    }
}

impl FromDynamic for i32 {
    fn from_dynamic(val: &Val) -> Self {
        as_i64(val)
            .unwrap_or_default()
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl FromDynamic for bool {
    fn from_dynamic(val: &Val) -> Self {
        match val {
            Val::Bool(v) => *v,
            Val::String(s) => !s.is_empty(),
            Val::Char(c) => *c != '\0',
            Val::List(items) => !items.is_empty(),
            Val::Option(opt) => opt.as_deref().map(bool::from_dynamic).unwrap_or(false),
            other => as_f64(other).map(|v| v != 0.0).unwrap_or(true),
        }
    }
}

impl FromDynamic for String {
    fn from_dynamic(val: &Val) -> Self {
        match val {
            Val::String(s) => s.clone(),
            Val::Char(c) => c.to_string(),
            _ => String::default(),
        }
    }
}

impl FromDynamic for char {
    fn from_dynamic(val: &Val) -> Self {
        match val {
            Val::Char(c) => *c,
            Val::String(s) => s.chars().next().unwrap_or_default(),
            _ => char::default(),
        }
    }
}

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn from_dynamic(val: &Val) -> Self {
        match val {
            Val::List(items) => items.iter().map(T::from_dynamic).collect(),
            _ => Vec::new(),
        }
    }
}
