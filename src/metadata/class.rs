use crate::{
    assembly::FieldReference,
    metadata::{AccessFlags, Method},
    Error, Result,
};

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Type descriptor of the declaring class
    pub defining_class: String,
    /// Field name
    pub name: String,
    /// Type descriptor of the field
    pub field_type: String,
    /// Access flags
    pub access_flags: AccessFlags,
}

impl Field {
    /// The reference used to access this field.
    #[must_use]
    pub fn reference(&self) -> FieldReference {
        FieldReference::new(
            self.defining_class.clone(),
            self.name.clone(),
            self.field_type.clone(),
        )
    }
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Type descriptor, e.g. `Lapp/Filter;`
    pub type_descriptor: String,
    /// Type descriptor of the super class
    pub super_class: Option<String>,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Declared fields
    pub fields: Vec<Field>,
    /// Declared methods. Methods are only ever appended, so indices stay stable.
    pub methods: Vec<Method>,
}

impl ClassDef {
    /// Creates an empty class.
    pub fn new(type_descriptor: impl Into<String>, access_flags: AccessFlags) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            super_class: Some("Ljava/lang/Object;".to_string()),
            access_flags,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Index of the first method named `name`.
    #[must_use]
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// First method named `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The static initializer, if present.
    #[must_use]
    pub fn static_initializer(&self) -> Option<&Method> {
        self.method("<clinit>")
    }

    /// The single field of `field_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] unless exactly one field has this type.
    pub fn single_field_of_type(&self, field_type: &str) -> Result<&Field> {
        let mut candidates = self.fields.iter().filter(|f| f.field_type == field_type);
        match (candidates.next(), candidates.next()) {
            (Some(field), None) => Ok(field),
            _ => Err(Error::PatternNotFound(format!(
                "single {} field in {}",
                field_type, self.type_descriptor
            ))),
        }
    }

    /// Appends a method, rejecting duplicate signatures. Returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDefinition`] if a method with the same prototype exists.
    pub fn add_method(&mut self, method: Method) -> Result<usize> {
        let reference = method.reference();
        if self
            .methods
            .iter()
            .any(|m| m.reference().signature_matches(&reference))
        {
            return Err(Error::DuplicateDefinition(method.to_string()));
        }
        self.methods.push(method);
        Ok(self.methods.len() - 1)
    }

    /// Appends a field, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDefinition`] if a field with the same name exists.
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(Error::DuplicateDefinition(field.reference().to_string()));
        }
        self.fields.push(field);
        Ok(())
    }
}
