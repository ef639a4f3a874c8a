//! Classes, fields and methods of the binary being instrumented.
//!
//! The model is deliberately small: a [`BytecodeContainer`] owns [`ClassDef`]s, classes own
//! [`Field`]s and [`Method`]s, and methods own an optional [`MethodImplementation`]. Classes and
//! methods are only ever appended, which keeps [`MethodId`] handles valid for a whole build.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dexweave::metadata::{AccessFlags, BytecodeContainer, ClassBuilder, MethodBuilder};
//!
//! let mut container = BytecodeContainer::new();
//! container.add_class(
//!     ClassBuilder::new("Lapp/Main;")
//!         .method(MethodBuilder::new("run").registers(1).body("return-void"))
//!         .build()?,
//! )?;
//! let run = container.find_method("Lapp/Main;", "run")?;
//! # Ok::<(), dexweave::Error>(())
//! ```

/// Implementation of class and method builders
mod builder;
/// Implementation of classes and fields
mod class;
/// Implementation of the class container
mod container;
/// Implementation of access flags
mod flags;
/// Implementation of methods and method bodies
mod method;

pub use builder::{ClassBuilder, MethodBuilder};
pub use class::{ClassDef, Field};
pub use container::{BytecodeContainer, MethodId};
pub use flags::AccessFlags;
pub use method::{Method, MethodImplementation, TryBlock};
