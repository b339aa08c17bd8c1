//! Registry of extension fields known to a decode call.
//!
//! Extensions are not materialized: the decoder consults the registry only to
//! recognize an unknown field as a registered extension, and keeps its bytes
//! as an unknown field either way.

use crate::arena::{AllocError, Arena};
use crate::containers::RepeatedField;
use crate::tables::{FieldLayout, MessageLayout};

/// An extension of `extendee` described like a regular field.
#[derive(Debug)]
pub struct ExtensionLayout {
    pub extendee: &'static MessageLayout,
    pub field: FieldLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("extension {number} of {extendee} is already registered")]
    Duplicate { extendee: &'static str, number: u32 },
    #[error("{extendee} already has a regular field numbered {number}")]
    Conflict { extendee: &'static str, number: u32 },
    #[error("arena allocation failed while registering an extension")]
    OutOfMemory,
}

impl From<AllocError> for RegistryError {
    fn from(_: AllocError) -> Self {
        RegistryError::OutOfMemory
    }
}

pub struct ExtensionRegistry<'a> {
    arena: &'a Arena,
    extensions: RepeatedField<'a, &'static ExtensionLayout>,
}

impl<'a> ExtensionRegistry<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        ExtensionRegistry {
            arena,
            extensions: RepeatedField::new(),
        }
    }

    pub fn add(&mut self, ext: &'static ExtensionLayout) -> Result<(), RegistryError> {
        let extendee = ext.extendee.full_name;
        let number = ext.field.number;
        if ext.extendee.field_index(number).is_some() {
            return Err(RegistryError::Conflict { extendee, number });
        }
        if self.find(ext.extendee, number).is_some() {
            return Err(RegistryError::Duplicate { extendee, number });
        }
        self.extensions.push(ext, self.arena)?;
        tracing::trace!(extendee, number, name = ext.field.name, "registered extension");
        Ok(())
    }

    pub fn find(&self, extendee: &MessageLayout, number: u32) -> Option<&'static ExtensionLayout> {
        self.extensions
            .iter()
            .copied()
            .find(|ext| ext.field.number == number && ext.extendee.full_name == extendee.full_name)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl core::fmt::Debug for ExtensionRegistry<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|ext| (ext.extendee.full_name, ext.field.number)))
            .finish()
    }
}
