use std::fmt;

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of classes, fields and methods
    pub struct AccessFlags: u32 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Only visible to the defining class
        const PRIVATE = 0x0002;
        /// Visible to the package and subclasses
        const PROTECTED = 0x0004;
        /// Not bound to an instance
        const STATIC = 0x0008;
        /// Not overridable / not reassignable
        const FINAL = 0x0010;
        /// Holds the instance monitor while running
        const SYNCHRONIZED = 0x0020;
        /// Compiler generated bridge method
        const BRIDGE = 0x0040;
        /// Last parameter is a rest argument
        const VARARGS = 0x0080;
        /// Implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Not directly present in source
        const SYNTHETIC = 0x1000;
        /// Enum class or enum constant
        const ENUM = 0x4000;
        /// Constructor or static initializer
        const CONSTRUCTOR = 0x1_0000;
    }
}

impl AccessFlags {
    /// Returns true if every flag of `required` is set.
    #[must_use]
    pub fn has_all(self, required: AccessFlags) -> bool {
        self.contains(required)
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect();
        f.write_str(&names.join(" "))
    }
}
