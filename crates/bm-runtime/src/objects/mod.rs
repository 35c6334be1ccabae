//! Forwarding program objects and the loader that builds them.

mod description;
mod generation;
mod loader;
mod parser;
mod pipeline;

pub use description::{
    ActionDesc, DefaultEntryDesc, DeparserDesc, FieldRef, HeaderDesc, HeaderTypeDesc, KeyDesc, LearnListDesc,
    ParseStateDesc, ParserDesc, PipelineDesc, ProgramDescription, RuntimeDataDesc, TableDesc, TransitionDesc,
};
pub use generation::ConfigGeneration;
pub use loader::{build_generation, parse_description, read_description, LoadError, LoadResult};
pub use parser::{Deparser, Parser};
pub use pipeline::{Pipeline, PipelineTable};
