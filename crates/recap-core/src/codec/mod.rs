//! Portable value codec
//!
//! Encodes arbitrary runtime values into a tagged, self-describing form
//! (payload plus canonical type descriptor) and decodes them back without any
//! implicit schema. Composite types register in the global [`TypeRegistry`];
//! everything else is structural.

mod descriptor;
mod registry;
mod value;

pub use descriptor::TypeDesc;
pub use registry::{Portable, TypeRegistry, register_portable};
pub use value::{Codec, DynValue};
