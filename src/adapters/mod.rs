// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod fs_source;
pub mod fs_temp;
pub mod in_memory;
pub mod probe_ffprobe;
pub mod toml_config;
pub mod tool;

pub use exec_ffmpeg::{FfmpegConcatAdapter, MergeConfig};
pub use fs_source::DirectorySegmentSource;
pub use fs_temp::TempArtifactStore;
pub use in_memory::{InMemoryArtifactStore, InMemoryMerge, InMemoryProbe, InMemorySegmentSource};
pub use probe_ffprobe::{FfprobeAdapter, ProbeConfig};
pub use toml_config::{ComposerConfig, SourceConfig};
