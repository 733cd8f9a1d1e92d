pub mod codegen;
pub mod config;
pub mod convert;
pub mod error;
pub mod ir;
pub mod lower;
pub mod parse;
pub mod steps;
pub mod wasm;

pub use config::ConvertOptions;
pub use convert::{
    Conversion, JenkinsJsonConverter, SourceConverter, convert, convert_to_json, convert_to_yaml,
};
pub use error::{ConvertError, Diagnostic};
