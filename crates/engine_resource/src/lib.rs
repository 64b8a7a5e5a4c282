//! Resource store, loaders and preloading for the engine.

pub mod error;
pub mod factory;
pub mod handle;
pub mod loader;
pub mod preloader;
pub mod source;

pub use error::ResourceError;
pub use factory::{DEFAULT_MAX_RESOURCES, ResourceDescriptor, ResourceFactory};
pub use handle::{ResourceData, ResourceHandle};
pub use loader::{DescriptorLoader, LoadedResource, ResourceLoader, decode_descriptor, extension_of};
pub use preloader::{
    DefaultPreloaderFactory, PreloadComplete, PreloadResult, Preloader, PreloaderFactory,
    ResourcePreloader,
};
pub use source::{DirSource, MemorySource, ResourceSource};
