use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for map loading, editing and saving.
#[derive(Debug, Error)]
pub enum MapError {
    /// A name or index lookup in a named list failed
    #[error("No item at {0}")]
    NotFound(String),

    /// A list refused to store an item (for example a layer from another map)
    #[error("Incompatible item: {0}")]
    IncompatibleItem(String),

    /// GID arithmetic was requested for a tileset the map does not use
    #[error("Tileset '{0}' is not in the map")]
    TilesetNotInMap(String),

    /// A tileset edit would leave placed tiles without their tileset
    #[error("Cannot remove tileset '{tileset}': map contains its tiles")]
    UsedTileset { tileset: String },

    /// The tilesets hold more tiles than a GID can address
    #[error("Too many tiles to be represented: {count} (limit {limit})")]
    TooManyTiles { count: u64, limit: u32 },

    /// A GID does not point into any tileset
    #[error("Invalid tile GID: {0}")]
    InvalidGid(u32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown encoding/compression name or a malformed payload
    #[error("Invalid layer encoding: {0}")]
    InvalidEncoding(String),

    /// Decoded layer data has the wrong number of tiles
    #[error("Invalid layer data: expected {expected} tiles, got {actual}")]
    InvalidLayerData { expected: usize, actual: usize },

    /// File I/O error
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON parse or serialization error
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document is structurally wrong (unsupported format, bad attribute)
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    #[error("Property '{name}' has unsupported type '{kind}'")]
    UnsupportedPropertyType { name: String, kind: String },

    #[error("Layer '{layer}' references GID {gid}, but the map only has {max_gid} tiles")]
    InvalidTileGid { layer: String, gid: u32, max_gid: u32 },

    #[error("Object {object_id} in layer '{layer}' references GID {gid}, but the map only has {max_gid} tiles")]
    InvalidObjectGid {
        layer: String,
        object_id: u32,
        gid: u32,
        max_gid: u32,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = MapError> = std::result::Result<T, E>;
