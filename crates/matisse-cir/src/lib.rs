// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! C intermediate representation: types as C, function instances, providers.
//!
//! A provider is a type-checker plus an instance builder for one generic
//! operation. Given a `ProviderContext` it decides whether it accepts the
//! call and, once accepted, builds a `FunctionInstance`: either an inline
//! expression tagged with a precedence level, or a standalone C function
//! with its own declaration, body, includes and dependencies. Instances are
//! identified by (operation name, signature) and deduplicated through an
//! `InstanceRegistry`.

pub mod builtins;
mod context;
pub mod ctype;
mod error;
mod function_type;
mod instance;
mod memo;
mod precedence;
mod provider;
mod registry;
mod settings;
mod table;

pub use context::ProviderContext;
pub use error::{format_types, CirError};
pub use function_type::FunctionType;
pub use instance::{
    ArgMode, DefinitionInstance, FunctionInstance, InlineForm, InlineInstance, InstanceKey,
    StandaloneBuilder, StandaloneInstance,
};
pub use memo::BuildCache;
pub use precedence::{CExpr, PrecedenceLevel};
pub use provider::InstanceProvider;
pub use registry::{InstanceGraph, InstanceRegistry, ResolvedCall};
pub use settings::Settings;
pub use table::{ProviderTable, ProviderTableBuilder};
