//! # insight-core
//!
//! Core abstractions for the delivery insight store.
//!
//! This crate provides the primitives shared by every insight component:
//!
//! - **Errors**: One typed taxonomy (`NotFound`, `InvalidInput`, `RangeTooLarge`, ...)
//! - **Storage**: The flat get/put blob store contract plus memory and local backends
//! - **Paths**: The single source of truth for the `insights/` blob layout
//! - **Documents**: Snapshot, milestone, block metadata and chunk encodings
//! - **Catalogue**: Listing contract of the application and deployment catalogues
//! - **Configuration**: Defaults plus `INSIGHT_*` environment overrides
//!
//! ## Example
//!
//! ```rust
//! use insight_core::prelude::*;
//!
//! let project = ProjectId::new("p1").unwrap();
//! let block = BlockId::for_year(2023);
//! assert_eq!(
//!     InsightPaths::deployment_block_metadata(&project, block),
//!     "insights/p1/deployments/block_2023/metadata.json"
//! );
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod id;
pub mod local_fs;
pub mod model;
pub mod observability;
pub mod paths;
pub mod project;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{
        Application, ApplicationLister, Deployment, DeploymentLister, ListOptions, ListPage,
    };
    pub use crate::config::{InsightConfig, StoreConfig};
    pub use crate::error::{Error, Result};
    pub use crate::id::{BlockId, ChunkId};
    pub use crate::model::{
        ApplicationActiveStatus, ApplicationData, ApplicationKind, DeploymentBlockMetadata,
        DeploymentChunk, DeploymentChunkMetadata, DeploymentData, DeploymentStatus, Labels,
        Milestone, ProjectApplicationData,
    };
    pub use crate::paths::InsightPaths;
    pub use crate::project::ProjectId;
    pub use crate::storage::{MemoryBackend, StorageBackend};
}

pub use error::{Error, Result};
pub use id::{BlockId, ChunkId};
pub use local_fs::LocalFsBackend;
pub use observability::{LogFormat, init_logging};
pub use paths::InsightPaths;
pub use project::ProjectId;
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend};
