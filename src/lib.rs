#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod base_path;
pub mod cache;
pub mod config;
mod html;
pub mod http;
pub mod manifest;
pub mod network;
pub mod page;
pub mod worker;

pub use base_path::{DeploymentContext, resolve_base_path};
pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::SiteConfig;
pub use manifest::{CacheVersion, CoreAssetManifest};
pub use network::{Disconnected, HttpNetwork, Network, SiteDirectory};
pub use page::{PageContext, register_worker};
pub use worker::{FetchEvent, OfflineWorker, WorkerSettings, WorkerState};
