use crate::cache::TilesetCache;
use crate::codec::{self, DataFormat};
use crate::error::MapError;
use crate::image::Image;
use crate::layer::{DrawOrder, Layer};
use crate::map::{Map, Orientation};
use crate::object::ObjectShape;
use crate::properties::{Color, Properties, PropertyValue};
use crate::tile::{TileValue, GID_MASK};
use crate::tileset::{Terrain, Tileset, TilesetKind, TilesetRef};
use glam::{vec2, Vec2};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum JsonLayerData {
    Tiles(Vec<u32>),
    Encoded(String),
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonLayer {
    #[serde(rename = "type", default = "tile_layer_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default)]
    pub offsetx: f32,
    #[serde(default)]
    pub offsety: f32,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonLayerData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<JsonObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draworder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagewidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageheight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparentcolor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<JsonProperty>,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}
fn tile_layer_type() -> String {
    "tilelayer".to_owned()
}
fn map_type() -> String {
    "map".to_owned()
}
fn orthogonal() -> String {
    "orthogonal".to_owned()
}
fn tileset_type() -> String {
    "tileset".to_owned()
}
pub(crate) fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonTilesetRef {
    pub firstgid: u32,
    pub source: String,
}

/// A map's tileset entry: a reference to a tileset file, or the tileset
/// itself.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum JsonTilesetEntry {
    External(JsonTilesetRef),
    Embedded(JsonTileset),
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonMap {
    #[serde(rename = "type", default = "map_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiledversion: Option<String>,
    pub width: u32,
    pub height: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default = "orthogonal")]
    pub orientation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderorder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backgroundcolor: Option<String>,
    #[serde(default)]
    pub infinite: bool,
    #[serde(default)]
    pub nextobjectid: u32,
    #[serde(default)]
    pub nextlayerid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staggeraxis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staggerindex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hexsidelength: Option<u32>,
    #[serde(default)]
    pub layers: Vec<JsonLayer>,
    #[serde(default)]
    pub tilesets: Vec<JsonTilesetEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<JsonProperty>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonOffset {
    pub x: i32,
    pub y: i32,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonTerrain {
    pub name: String,
    #[serde(default = "no_tile")]
    pub tile: i64,
}

fn no_tile() -> i64 {
    -1
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonTileset {
    #[serde(rename = "type", default = "tileset_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub firstgid: u32,
    #[serde(default)]
    pub name: String,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub tilecount: u32,
    #[serde(default)]
    pub columns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagewidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageheight: Option<u32>,
    #[serde(default)]
    pub spacing: u32,
    #[serde(default)]
    pub margin: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparentcolor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileoffset: Option<JsonOffset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terrains: Vec<JsonTerrain>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<JsonProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiles: Vec<JsonTile>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonProperty {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: JsonValue,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonObject {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing)]
    pub class: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub point: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ellipse: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<JsonObjectPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polyline: Vec<JsonObjectPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<JsonProperty>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonObjectPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct JsonTile {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<JsonProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagewidth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imageheight: Option<u32>,
}

fn json_property_to_value(prop: JsonProperty) -> Result<Option<(String, PropertyValue)>, MapError> {
    let JsonProperty { name, kind, value } = prop;

    let parsed = match kind.as_deref() {
        Some("bool") => value.as_bool().map(PropertyValue::Bool),
        Some("int") => value.as_i64().map(PropertyValue::I64),
        Some("object") => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(PropertyValue::Object)
            .or_else(|| value.as_i64().map(PropertyValue::I64)),
        Some("float") => value.as_f64().map(PropertyValue::F64),
        Some("string") => value.as_str().map(|s| PropertyValue::String(s.to_owned())),
        Some("file") => value.as_str().map(|s| PropertyValue::File(s.to_owned())),
        Some("color") => match value.as_str() {
            Some("") | None => None,
            Some(s) => Some(PropertyValue::Color(Color::from_hex(s)?)),
        },
        Some(other) => {
            return Err(MapError::UnsupportedPropertyType {
                name,
                kind: other.to_owned(),
            });
        }
        None => {
            if let Some(v) = value.as_bool() {
                Some(PropertyValue::Bool(v))
            } else if let Some(v) = value.as_i64() {
                Some(PropertyValue::I64(v))
            } else if let Some(v) = value.as_f64() {
                Some(PropertyValue::F64(v))
            } else {
                value.as_str().map(|s| PropertyValue::String(s.to_owned()))
            }
        }
    };

    Ok(parsed.map(|value| (name, value)))
}

pub(crate) fn properties_from_json(props: Vec<JsonProperty>) -> Result<Properties, MapError> {
    let mut out = Properties::new();
    for p in props {
        if let Some((name, value)) = json_property_to_value(p)? {
            out.insert(name, value);
        }
    }
    Ok(out)
}

fn parse_color(s: Option<&str>) -> Result<Option<Color>, MapError> {
    s.filter(|s| !s.is_empty()).map(Color::from_hex).transpose()
}

/// Maps the GIDs of a document onto the map's contiguous numbering.
///
/// Documents may leave gaps between tilesets (`firstgid` values that are
/// not the running total); each document range is shifted to where its
/// tileset actually starts.
struct GidTranslation {
    ranges: Vec<(u32, u32, u32)>, // (document first gid, map first gid, len)
    max_gid: u32,
}

impl GidTranslation {
    fn is_identity(&self) -> bool {
        self.ranges.iter().all(|(doc, first, _)| doc == first)
    }

    fn translate(&self, gid: u32) -> Option<u32> {
        if self.is_identity() {
            return (gid <= self.max_gid).then_some(gid);
        }
        self.ranges
            .iter()
            .find(|(doc, _, len)| gid >= *doc && gid - doc < *len)
            .map(|(doc, first, _)| first + (gid - doc))
    }
}

fn shape_from_json(obj: &JsonObject) -> ObjectShape {
    let points = |pts: &[JsonObjectPoint]| pts.iter().map(|p| vec2(p.x, p.y)).collect();
    let size = vec2(obj.width, obj.height);
    if let Some(gid) = obj.gid {
        ObjectShape::Tile {
            value: TileValue::new(gid),
        }
    } else if obj.point {
        ObjectShape::Point
    } else if obj.ellipse {
        ObjectShape::Ellipse { size }
    } else if !obj.polygon.is_empty() {
        ObjectShape::Polygon {
            points: points(&obj.polygon),
        }
    } else if !obj.polyline.is_empty() {
        ObjectShape::Polyline {
            points: points(&obj.polyline),
        }
    } else {
        ObjectShape::Rectangle { size }
    }
}

/// Build a tileset from its JSON form. Image paths are kept as written.
pub(crate) fn tileset_from_json(js: JsonTileset) -> Result<Tileset, MapError> {
    if let Some(id) = js.tiles.iter().map(|t| t.id).max() {
        if id >= GID_MASK {
            return Err(MapError::InvalidMap(format!(
                "tileset '{}' has tile id {id}, the limit is {GID_MASK}",
                js.name
            )));
        }
    }
    if js.tilecount > GID_MASK {
        return Err(MapError::InvalidMap(format!(
            "tileset '{}' declares {} tiles, the limit is {GID_MASK}",
            js.name, js.tilecount
        )));
    }
    let tile_size = (js.tilewidth, js.tileheight);
    let kind = match js.image.as_deref().filter(|s| !s.is_empty()) {
        Some(source) => {
            let size = match (js.imagewidth, js.imageheight) {
                (Some(w), Some(h)) => (w, h),
                _ => {
                    // no image size recorded: the smallest image that holds the grid
                    let cols = js.columns;
                    let rows = if cols == 0 { 0 } else { js.tilecount.div_ceil(cols) };
                    let span = |n: u32, tile: u32| {
                        js.margin
                            .saturating_mul(2)
                            .saturating_add(n.saturating_mul(tile))
                            .saturating_add(n.saturating_sub(1).saturating_mul(js.spacing))
                    };
                    (span(cols, js.tilewidth), span(rows, js.tileheight))
                }
            };
            let mut image = Image::new(source, size);
            image.trans = parse_color(js.transparentcolor.as_deref())?;
            TilesetKind::ImageGrid {
                image,
                margin: js.margin,
                spacing: js.spacing,
            }
        }
        None => {
            let mut images = vec![None; js.tilecount as usize];
            for tile in &js.tiles {
                let Some(source) = tile.image.as_deref() else {
                    continue;
                };
                let slot = tile.id as usize;
                if slot >= images.len() {
                    images.resize(slot + 1, None);
                }
                images[slot] = Some(Image::new(
                    source,
                    (
                        tile.imagewidth.unwrap_or(js.tilewidth),
                        tile.imageheight.unwrap_or(js.tileheight),
                    ),
                ));
            }
            TilesetKind::Individual {
                images,
                columns: (js.columns > 0).then_some(js.columns),
            }
        }
    };

    let mut tileset = Tileset::new(js.name, tile_size, kind);
    tileset.properties = properties_from_json(js.properties)?;
    tileset.tile_offset = js.tileoffset.map_or((0, 0), |o| (o.x, o.y));
    for terrain in js.terrains {
        tileset.terrains.push(Terrain {
            name: terrain.name,
            tile: u32::try_from(terrain.tile).ok(),
        })?;
    }
    for tile in js.tiles {
        let properties = properties_from_json(tile.properties)?;
        if properties.is_empty() && tile.probability.is_none() && tile.terrain.is_none() {
            continue;
        }
        let attrs = tileset.attributes_mut(tile.id);
        attrs.properties = properties;
        attrs.probability = tile.probability;
        attrs.terrain_indices = tile.terrain.unwrap_or_default();
    }

    if js.tilecount != 0 && js.tilecount != tileset.len() {
        warn!(
            "tileset '{}' declares {} tiles but holds {}",
            tileset.name,
            js.tilecount,
            tileset.len()
        );
    }
    Ok(tileset)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MapError> {
    let txt = std::fs::read_to_string(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| MapError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn require_json_extension(path: &Path, what: &str) -> Result<(), MapError> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(MapError::InvalidMap(format!(
            "{what} must be a JSON file: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Load a standalone tileset file.
pub fn load_tileset(path: &Path) -> Result<Tileset, MapError> {
    require_json_extension(path, "Tileset file")?;
    let js: JsonTileset = read_json(path)?;
    let tileset = tileset_from_json(js)?;
    info!("loaded tileset '{}' from {}", tileset.name, path.display());
    Ok(tileset)
}

pub fn load_map(path: &Path, cache: &mut TilesetCache) -> Result<Map, MapError> {
    require_json_extension(path, "Map file")?;
    let j: JsonMap = read_json(path)?;
    let map_dir = path
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));
    let map = build_map(j, Some(&map_dir), cache)?;
    info!(
        "loaded map {} ({} layers, {} tilesets)",
        path.display(),
        map.layers().len(),
        map.tilesets().len()
    );
    Ok(map)
}

pub fn parse_map(json: &str, base_path: Option<&Path>, cache: &mut TilesetCache) -> Result<Map, MapError> {
    let j: JsonMap = serde_json::from_str(json).map_err(|source| MapError::Json {
        path: base_path.map_or_else(|| PathBuf::from("<string>"), Path::to_path_buf),
        source,
    })?;
    build_map(j, base_path, cache)
}

fn build_map(j: JsonMap, dir: Option<&Path>, cache: &mut TilesetCache) -> Result<Map, MapError> {
    if j.infinite {
        return Err(MapError::InvalidMap("infinite maps are not supported".into()));
    }
    let mut map = Map::new((j.width, j.height), (j.tilewidth, j.tileheight));
    map.orientation = Orientation::parse(&j.orientation)?;
    map.render_order = j.renderorder;
    map.background_color = parse_color(j.backgroundcolor.as_deref())?;
    map.tiled_version = j.tiledversion;
    map.stagger_axis = j.staggeraxis;
    map.stagger_index = j.staggerindex;
    map.hex_side_length = j.hexsidelength;
    map.properties = properties_from_json(j.properties)?;
    map.base_path = dir.map(Path::to_path_buf);

    let mut ranges = Vec::with_capacity(j.tilesets.len());
    for entry in j.tilesets {
        let (doc_first, tileset) = match entry {
            JsonTilesetEntry::External(r) => {
                let path = dir.unwrap_or_else(|| Path::new(".")).join(&r.source);
                require_json_extension(&path, "External tileset")?;
                (r.firstgid, cache.get_or_load(&path, load_tileset)?)
            }
            JsonTilesetEntry::Embedded(ts) => {
                (ts.firstgid, TilesetRef::new(tileset_from_json(ts)?))
            }
        };
        map.tilesets_mut().push(tileset.clone())?;
        ranges.push((doc_first, tileset.first_gid(&map)?, tileset.len()));
    }
    let gids = GidTranslation {
        ranges,
        max_gid: map.end_gid(),
    };
    if !gids.is_identity() {
        warn!("tileset firstgids are not contiguous, renumbering tiles");
    }

    let mut max_object_id = 0;
    for jl in j.layers {
        let layer = layer_from_json(&map, jl, &gids)?;
        if let Some(objects) = layer.as_objects() {
            max_object_id = objects.objects().iter().map(|o| o.id).fold(max_object_id, u32::max);
        }
        map.layers_mut().push(layer)?;
    }
    map.next_object_id = j.nextobjectid.max(max_object_id.saturating_add(1));
    map.next_layer_id = j.nextlayerid.max(1);
    Ok(map)
}

fn layer_from_json(map: &Map, jl: JsonLayer, gids: &GidTranslation) -> Result<Layer, MapError> {
    let layer_name = jl.name.clone();
    let mut layer = match jl.kind.as_str() {
        "tilelayer" => {
            let size = (jl.width.unwrap_or(map.width()), jl.height.unwrap_or(map.height()));
            if size != map.size() {
                return Err(MapError::InvalidMap(format!(
                    "layer '{layer_name}' is {}x{} tiles, map is {}x{}",
                    size.0,
                    size.1,
                    map.width(),
                    map.height()
                )));
            }
            let count = size.0 as usize * size.1 as usize;
            let (raw, format) = match jl.data {
                None => (vec![0; count], DataFormat::default()),
                Some(JsonLayerData::Tiles(data)) => (data, DataFormat::CSV),
                Some(JsonLayerData::Encoded(payload)) => {
                    let format = DataFormat::from_names(
                        jl.encoding.as_deref().unwrap_or("base64"),
                        jl.compression.as_deref(),
                    )?;
                    (codec::decode(&payload, format, count)?, format)
                }
            };
            let raw = raw
                .into_iter()
                .map(|raw| {
                    let value = TileValue::new(raw);
                    if value.is_empty() {
                        return Ok(raw);
                    }
                    match gids.translate(value.gid()) {
                        Some(gid) => Ok(value.with_gid(gid).raw()),
                        None => Err(MapError::InvalidTileGid {
                            layer: layer_name.clone(),
                            gid: value.gid(),
                            max_gid: gids.max_gid,
                        }),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut layer = map.new_tile_layer(jl.name);
            if let Some(tiles) = layer.as_tiles_mut() {
                tiles.set_raw_data(raw)?;
                tiles.format = format;
            }
            layer
        }
        "objectgroup" => {
            let mut layer = map.new_object_layer(jl.name);
            if let Some(group) = layer.as_objects_mut() {
                group.color = parse_color(jl.color.as_deref())?;
                if let Some(order) = jl.draworder.as_deref() {
                    group.draw_order = DrawOrder::parse(order)?;
                }
                for obj in jl.objects.unwrap_or_default() {
                    let mut shape = shape_from_json(&obj);
                    if let ObjectShape::Tile { value } = &mut shape {
                        let gid = value.gid();
                        match gids.translate(gid).filter(|_| gid != 0) {
                            Some(new_gid) => value.set_gid(new_gid),
                            None => {
                                return Err(MapError::InvalidObjectGid {
                                    layer: layer_name.clone(),
                                    object_id: obj.id,
                                    gid,
                                    max_gid: gids.max_gid,
                                })
                            }
                        }
                    }
                    let mut object = group.new_object(shape);
                    object.id = obj.id;
                    object.name = obj.name;
                    object.class = if !obj.class.is_empty() {
                        obj.class
                    } else {
                        obj.kind
                    };
                    object.pixel_pos = vec2(obj.x, obj.y);
                    object.rotation = obj.rotation;
                    object.visible = obj.visible;
                    object.properties = properties_from_json(obj.properties)?;
                    group.objects_mut().push(object)?;
                }
            }
            layer
        }
        "imagelayer" => {
            let image = match jl.image.as_deref().filter(|s| !s.is_empty()) {
                Some(source) => {
                    let mut image = Image::new(
                        source,
                        (jl.imagewidth.unwrap_or(0), jl.imageheight.unwrap_or(0)),
                    );
                    image.trans = parse_color(jl.transparentcolor.as_deref())?;
                    Some(image)
                }
                None => None,
            };
            map.new_image_layer(jl.name, image)
        }
        "group" => {
            return Err(MapError::InvalidMap(format!(
                "group layer '{layer_name}' is not supported"
            )))
        }
        other => {
            return Err(MapError::InvalidMap(format!(
                "layer '{layer_name}' has unknown type '{other}'"
            )))
        }
    };

    layer.id = jl.id;
    layer.visible = jl.visible;
    layer
        .set_opacity(jl.opacity)
        .map_err(|e| MapError::InvalidMap(format!("layer '{layer_name}': {e}")))?;
    layer.offset = Vec2::new(jl.offsetx, jl.offsety);
    layer.properties = properties_from_json(jl.properties)?;
    Ok(layer)
}
