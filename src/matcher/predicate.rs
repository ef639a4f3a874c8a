use std::{fmt, sync::Arc};

use crate::metadata::{ClassDef, Method};

type Predicate = Arc<dyn Fn(&Method, &ClassDef) -> bool + Send + Sync>;

/// A composable predicate over a method and its declaring class.
#[derive(Clone)]
pub enum MethodPredicate {
    /// Method name equals
    Name(String),
    /// Declaring class descriptor ends with the suffix
    ClassSuffix(String),
    /// Arbitrary closure
    Custom(Predicate),
    /// Both must hold
    And(Box<MethodPredicate>, Box<MethodPredicate>),
    /// Either must hold
    Or(Box<MethodPredicate>, Box<MethodPredicate>),
    /// Negation
    Not(Box<MethodPredicate>),
}

impl MethodPredicate {
    /// Wraps a closure.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Method, &ClassDef) -> bool + Send + Sync + 'static,
    {
        MethodPredicate::Custom(Arc::new(predicate))
    }

    /// Matches methods named `name`.
    pub fn name(name: impl Into<String>) -> Self {
        MethodPredicate::Name(name.into())
    }

    /// Matches methods of classes whose descriptor ends with `suffix`.
    pub fn class_suffix(suffix: impl Into<String>) -> Self {
        MethodPredicate::ClassSuffix(suffix.into())
    }

    /// Both `self` and `other`.
    #[must_use]
    pub fn and(self, other: MethodPredicate) -> Self {
        MethodPredicate::And(Box::new(self), Box::new(other))
    }

    /// Either `self` or `other`.
    #[must_use]
    pub fn or(self, other: MethodPredicate) -> Self {
        MethodPredicate::Or(Box::new(self), Box::new(other))
    }

    /// The negation of `self`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        MethodPredicate::Not(Box::new(self))
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(&self, method: &Method, class: &ClassDef) -> bool {
        match self {
            MethodPredicate::Name(name) => method.name == *name,
            MethodPredicate::ClassSuffix(suffix) => class.type_descriptor.ends_with(suffix.as_str()),
            MethodPredicate::Custom(predicate) => predicate(method, class),
            MethodPredicate::And(a, b) => a.evaluate(method, class) && b.evaluate(method, class),
            MethodPredicate::Or(a, b) => a.evaluate(method, class) || b.evaluate(method, class),
            MethodPredicate::Not(inner) => !inner.evaluate(method, class),
        }
    }
}

impl fmt::Debug for MethodPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodPredicate::Name(name) => write!(f, "name == {name:?}"),
            MethodPredicate::ClassSuffix(suffix) => write!(f, "class ends with {suffix:?}"),
            MethodPredicate::Custom(_) => f.write_str("custom"),
            MethodPredicate::And(a, b) => write!(f, "({a:?} && {b:?})"),
            MethodPredicate::Or(a, b) => write!(f, "({a:?} || {b:?})"),
            MethodPredicate::Not(inner) => write!(f, "!{inner:?}"),
        }
    }
}
