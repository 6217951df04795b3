//! dotXSI support.
//!
//! This module parses dotXSI text files (version 5.0 and later, 32-bit
//! floats) and converts their model trees into a single [`Mesh`]:
//!
//! - `SI_Model` trees: joints, transforms and animation curves
//! - `XSI_Mesh`: shape attributes, vertex lists and polygon lists
//! - `SI_MaterialLibrary` / `XSI_ImageLibrary`: OGL multi-texture materials
//! - `SI_EnvelopeList`: skin weights
//!
//! Cameras, lights, custom parameter sets, mixers, clusters and IK chains are
//! recognized and skipped.
//!
//! # Example
//!
//! ```ignore
//! use xsi_core::xsi::{load_xsi, LoadOptions};
//! use xsi_core::Mesh;
//!
//! let mut mesh = Mesh::new("scene");
//! let report = load_xsi(&mut mesh, "path/to/scene.xsi", &LoadOptions::default())?;
//! for diagnostic in &report.diagnostics {
//!     println!("line {}: {}", diagnostic.line, diagnostic.message);
//! }
//! ```
//!
//! [`Mesh`]: crate::mesh::Mesh

mod cluster;
mod envelope;
mod loader;
mod material;
mod model;
pub mod parser;
pub mod scanner;
mod shape;
pub mod types;

pub use loader::*;
pub use material::DEFAULT_MATERIAL;
pub use scanner::{ParseError, ParseResult, Scanner, TokenKind};
