//! XSI Core - dotXSI scene loading for real-time rendering.
//!
//! This crate provides:
//!
//! - **Render mesh types**: `Mesh`, `Vertex`, `Cluster`, `Material`
//! - **Skeletons**: joint hierarchies with sampled animation channels
//! - **Textures**: a name-addressed texture cache backed by the `image` crate
//! - **dotXSI support**: text file parsing and scene loading
//!
//! # Example
//!
//! ```ignore
//! use xsi_core::{load_xsi, LoadOptions, Mesh};
//!
//! // Load a dotXSI scene into an empty mesh
//! let mut mesh = Mesh::new("scene");
//! let report = load_xsi(&mut mesh, "scene.xsi", &LoadOptions::default())?;
//! println!("Loaded {} clusters, {} triangles",
//!     report.clusters,
//!     report.triangles);
//! ```

pub mod material;
pub mod mesh;
pub mod skeleton;
pub mod texture;
pub mod xsi;

// Re-export commonly used types
pub use material::Material;
pub use mesh::{Cluster, Face, Mesh, Vertex};
pub use skeleton::{Joint, Skeleton};
pub use texture::{Texture, TextureCache};
pub use xsi::{load_xsi, load_xsi_from_string, Diagnostic, LoadError, LoadOptions, LoadReport};
