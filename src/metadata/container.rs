//! The set of classes a build operates on.

use std::{collections::HashMap, fmt};

use crate::{
    metadata::{ClassDef, Method},
    Error, Result,
};

/// Stable handle of a method inside a [`BytecodeContainer`].
///
/// Classes and methods are only appended, never removed, so a handle stays valid for the whole
/// build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    /// Class slot
    pub class: usize,
    /// Method slot within the class
    pub method: usize,
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.class, self.method)
    }
}

/// Classes of one build, addressed by type descriptor or [`MethodId`].
#[derive(Debug, Clone, Default)]
pub struct BytecodeContainer {
    classes: Vec<ClassDef>,
    by_descriptor: HashMap<String, usize>,
}

impl BytecodeContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class and returns its slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDefinition`] if the type descriptor is already present.
    pub fn add_class(&mut self, class: ClassDef) -> Result<usize> {
        if self.by_descriptor.contains_key(&class.type_descriptor) {
            return Err(Error::DuplicateDefinition(class.type_descriptor));
        }
        let slot = self.classes.len();
        self.by_descriptor
            .insert(class.type_descriptor.clone(), slot);
        self.classes.push(class);
        Ok(slot)
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the container holds no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All classes in insertion order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Slot of the class with `descriptor`.
    #[must_use]
    pub fn class_index(&self, descriptor: &str) -> Option<usize> {
        self.by_descriptor.get(descriptor).copied()
    }

    /// Class with `descriptor`.
    #[must_use]
    pub fn class(&self, descriptor: &str) -> Option<&ClassDef> {
        self.class_index(descriptor).map(|slot| &self.classes[slot])
    }

    /// Class with `descriptor`, or [`Error::ClassNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if no such class exists.
    pub fn class_or_err(&self, descriptor: &str) -> Result<&ClassDef> {
        self.class(descriptor)
            .ok_or_else(|| Error::ClassNotFound(descriptor.to_string()))
    }

    /// Class at `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] for unknown slots.
    pub fn class_at(&self, slot: usize) -> Result<&ClassDef> {
        self.classes
            .get(slot)
            .ok_or_else(|| Error::ClassNotFound(format!("#{slot}")))
    }

    /// Mutable class at `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] for unknown slots.
    pub fn class_at_mut(&mut self, slot: usize) -> Result<&mut ClassDef> {
        self.classes
            .get_mut(slot)
            .ok_or_else(|| Error::ClassNotFound(format!("#{slot}")))
    }

    /// The method behind `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] for stale or foreign handles.
    pub fn method(&self, id: MethodId) -> Result<&Method> {
        self.classes
            .get(id.class)
            .and_then(|class| class.methods.get(id.method))
            .ok_or_else(|| Error::MethodNotFound(id.to_string()))
    }

    /// The method behind `id`, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] for stale or foreign handles.
    pub fn method_mut(&mut self, id: MethodId) -> Result<&mut Method> {
        self.classes
            .get_mut(id.class)
            .and_then(|class| class.methods.get_mut(id.method))
            .ok_or_else(|| Error::MethodNotFound(id.to_string()))
    }

    /// Looks up a method by class descriptor and name.
    ///
    /// # Errors
    ///
    /// [`Error::ClassNotFound`] or [`Error::MethodNotFound`].
    pub fn find_method(&self, class: &str, name: &str) -> Result<MethodId> {
        let slot = self
            .class_index(class)
            .ok_or_else(|| Error::ClassNotFound(class.to_string()))?;
        let method = self.classes[slot]
            .method_index(name)
            .ok_or_else(|| Error::MethodNotFound(format!("{class}->{name}")))?;
        Ok(MethodId {
            class: slot,
            method,
        })
    }

    /// Appends a method to the class at `slot`.
    ///
    /// # Errors
    ///
    /// [`Error::ClassNotFound`] or [`Error::DuplicateDefinition`].
    pub fn add_method(&mut self, slot: usize, method: Method) -> Result<MethodId> {
        let index = self.class_at_mut(slot)?.add_method(method)?;
        Ok(MethodId {
            class: slot,
            method: index,
        })
    }

    /// Iterates over every method with its handle.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.classes.iter().enumerate().flat_map(|(class, def)| {
            def.methods
                .iter()
                .enumerate()
                .map(move |(method, m)| (MethodId { class, method }, m))
        })
    }
}
