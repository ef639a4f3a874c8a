//! Builders for classes and methods.
//!
//! Method bodies are given as mini-assembly text. Try blocks refer to labels of that text:
//!
//! ```rust,ignore
//! let method = MethodBuilder::new("load")
//!     .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
//!     .returns("V")
//!     .registers(2)
//!     .body(":start\ninvoke-static {}, Lapp/Io;->read()V\n:end\nreturn-void\n:handler\nmove-exception v0\nreturn-void")
//!     .try_block("start", "end", "handler", Some("Ljava/io/IOException;"))
//!     .build("Lapp/Loader;")?;
//! ```

use crate::{
    metadata::{AccessFlags, ClassDef, Field, Method, MethodImplementation, TryBlock},
    Error, Result,
};

#[derive(Debug, Clone)]
struct TrySpec {
    start: String,
    end: String,
    handler: String,
    exception_type: Option<String>,
}

/// Builder for a [`Method`].
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    name: String,
    parameters: Vec<String>,
    return_type: String,
    access_flags: AccessFlags,
    registers: Option<u16>,
    body: Option<String>,
    try_blocks: Vec<TrySpec>,
}

impl MethodBuilder {
    /// Starts a public `()V` method named `name` without a body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: "V".to_string(),
            access_flags: AccessFlags::PUBLIC,
            registers: None,
            body: None,
            try_blocks: Vec::new(),
        }
    }

    /// Sets the parameter type descriptors.
    #[must_use]
    pub fn parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the return type descriptor.
    #[must_use]
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// Sets the access flags.
    #[must_use]
    pub fn access(mut self, access_flags: AccessFlags) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Sets the total register count, parameters included.
    #[must_use]
    pub fn registers(mut self, registers: u16) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Sets the body text.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a try block spanning the labels `start` to `end` (inclusive) of the body.
    #[must_use]
    pub fn try_block(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
        handler: impl Into<String>,
        exception_type: Option<&str>,
    ) -> Self {
        self.try_blocks.push(TrySpec {
            start: start.into(),
            end: end.into(),
            handler: handler.into(),
            exception_type: exception_type.map(str::to_string),
        });
        self
    }

    /// Builds the method for the class `defining_class`.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`] if fewer registers than parameter registers are declared
    /// - [`Error::UnknownLabel`] for try blocks naming labels the body does not define
    /// - any editor error of the body
    pub fn build(self, defining_class: &str) -> Result<Method> {
        let mut method = Method::new(
            defining_class,
            self.name,
            self.parameters,
            self.return_type,
            self.access_flags,
        );

        let Some(body) = self.body else {
            return Ok(method);
        };

        let parameter_registers = method.parameter_registers();
        let registers = self.registers.unwrap_or(parameter_registers);
        if registers < parameter_registers {
            return Err(malformed_error!(
                "{} declares {} registers but its parameters need {}",
                method,
                registers,
                parameter_registers
            ));
        }

        method.implementation = Some(MethodImplementation::new(registers));
        let inserted = method.editor()?.add_instructions(0, &body)?;

        if let Some(implementation) = method.implementation.as_mut() {
            for spec in self.try_blocks {
                let lookup = |name: &str| {
                    inserted
                        .label(name)
                        .ok_or_else(|| Error::UnknownLabel(name.to_string()))
                };
                implementation.add_try_block(TryBlock {
                    start: lookup(&spec.start)?,
                    end: lookup(&spec.end)?,
                    handler: lookup(&spec.handler)?,
                    exception_type: spec.exception_type,
                })?;
            }
        }

        Ok(method)
    }
}

/// Builder for a [`ClassDef`].
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassDef,
    methods: Vec<MethodBuilder>,
}

impl ClassBuilder {
    /// Starts a public class with `type_descriptor`.
    pub fn new(type_descriptor: impl Into<String>) -> Self {
        Self {
            class: ClassDef::new(type_descriptor, AccessFlags::PUBLIC),
            methods: Vec::new(),
        }
    }

    /// Sets the super class.
    #[must_use]
    pub fn super_class(mut self, super_class: impl Into<String>) -> Self {
        self.class.super_class = Some(super_class.into());
        self
    }

    /// Sets the access flags.
    #[must_use]
    pub fn access(mut self, access_flags: AccessFlags) -> Self {
        self.class.access_flags = access_flags;
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: impl Into<String>,
        access_flags: AccessFlags,
    ) -> Self {
        self.class.fields.push(Field {
            defining_class: self.class.type_descriptor.clone(),
            name: name.into(),
            field_type: field_type.into(),
            access_flags,
        });
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Builds the class.
    ///
    /// # Errors
    ///
    /// Any method build error, or [`Error::DuplicateDefinition`] for clashing members.
    pub fn build(self) -> Result<ClassDef> {
        let mut class = ClassDef {
            fields: Vec::new(),
            ..self.class
        };
        for field in self.class.fields {
            class.add_field(field)?;
        }
        for method in self.methods {
            let method = method.build(&class.type_descriptor)?;
            class.add_method(method)?;
        }
        Ok(class)
    }
}
