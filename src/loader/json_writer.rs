//! Tiled JSON output.
//!
//! Tilesets loaded from their own file are written back as references to
//! that file; every other tileset is embedded in the map document.

use crate::cache::canonical_path;
use crate::codec::{self, Encoding};
use crate::error::{MapError, Result};
use crate::image::Image;
use crate::layer::{Layer, LayerKind};
use crate::loader::json_loader::{
    JsonLayer, JsonLayerData, JsonMap, JsonObject, JsonObjectPoint, JsonOffset, JsonProperty,
    JsonTerrain, JsonTile, JsonTileset, JsonTilesetEntry, JsonTilesetRef,
};
use crate::map::Map;
use crate::object::{MapObject, ObjectShape};
use crate::properties::{Properties, PropertyValue};
use crate::tileset::{Tileset, TilesetKind};
use log::info;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Output settings for [`Map::save`] and [`Map::to_json_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Indent the document.
    pub pretty: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

fn properties_to_json(props: &Properties) -> Vec<JsonProperty> {
    props
        .iter()
        .map(|(name, value)| {
            let json = match value {
                PropertyValue::Bool(v) => JsonValue::from(*v),
                PropertyValue::I64(v) => JsonValue::from(*v),
                PropertyValue::F64(v) => JsonValue::from(*v),
                PropertyValue::String(v) | PropertyValue::File(v) => JsonValue::from(v.as_str()),
                PropertyValue::Color(c) => JsonValue::from(c.to_hex()),
                PropertyValue::Object(id) => JsonValue::from(*id),
            };
            JsonProperty {
                name: name.to_owned(),
                kind: Some(value.type_name().to_owned()),
                value: json,
            }
        })
        .collect()
}

fn hex(color: Option<crate::properties::Color>) -> Option<String> {
    color.map(|c| c.to_hex())
}

pub(crate) fn tileset_to_json(tileset: &Tileset, firstgid: u32) -> JsonTileset {
    let mut attributed: BTreeSet<u32> = tileset.tile_attributes.keys().copied().collect();
    let (image, imagewidth, imageheight, margin, spacing, transparentcolor) = match &tileset.kind {
        TilesetKind::ImageGrid {
            image,
            margin,
            spacing,
        } => (
            Some(image.source.clone()),
            Some(image.width()),
            Some(image.height()),
            *margin,
            *spacing,
            hex(image.trans),
        ),
        TilesetKind::Individual { images, .. } => {
            attributed.extend(
                images
                    .iter()
                    .enumerate()
                    .filter(|(_, img)| img.is_some())
                    .map(|(n, _)| n as u32),
            );
            (None, None, None, 0, 0, None)
        }
    };

    let tile_image = |n: u32| -> Option<&Image> {
        match &tileset.kind {
            TilesetKind::Individual { images, .. } => images.get(n as usize)?.as_ref(),
            TilesetKind::ImageGrid { .. } => None,
        }
    };
    let tiles = attributed
        .into_iter()
        .map(|id| {
            let attrs = tileset.tile_attributes.get(&id);
            let image = tile_image(id);
            JsonTile {
                id,
                properties: attrs.map(|a| properties_to_json(&a.properties)).unwrap_or_default(),
                probability: attrs.and_then(|a| a.probability),
                terrain: attrs
                    .filter(|a| !a.terrain_indices.is_empty())
                    .map(|a| a.terrain_indices.clone()),
                image: image.map(|i| i.source.clone()),
                imagewidth: image.map(Image::width),
                imageheight: image.map(Image::height),
            }
        })
        .collect();

    JsonTileset {
        kind: "tileset".to_owned(),
        firstgid,
        name: tileset.name.clone(),
        tilewidth: tileset.tile_size.0,
        tileheight: tileset.tile_size.1,
        tilecount: tileset.len(),
        columns: tileset.column_count(),
        image,
        imagewidth,
        imageheight,
        spacing,
        margin,
        transparentcolor,
        tileoffset: (tileset.tile_offset != (0, 0)).then_some(JsonOffset {
            x: tileset.tile_offset.0,
            y: tileset.tile_offset.1,
        }),
        terrains: tileset
            .terrains
            .iter()
            .map(|t| JsonTerrain {
                name: t.name.clone(),
                tile: t.tile.map_or(-1, i64::from),
            })
            .collect(),
        properties: properties_to_json(&tileset.properties),
        tiles,
    }
}

fn object_to_json(object: &MapObject, map: &Map) -> Result<JsonObject> {
    let points = |pts: &[glam::Vec2]| {
        pts.iter()
            .map(|p| JsonObjectPoint { x: p.x, y: p.y })
            .collect()
    };
    let size = object.pixel_size(map.tilesets())?;
    let mut json = JsonObject {
        id: object.id,
        name: object.name.clone(),
        kind: object.class.clone(),
        class: String::new(),
        x: object.pixel_pos.x,
        y: object.pixel_pos.y,
        width: size.x,
        height: size.y,
        rotation: object.rotation,
        visible: object.visible,
        point: false,
        ellipse: false,
        polygon: Vec::new(),
        polyline: Vec::new(),
        gid: None,
        properties: properties_to_json(&object.properties),
    };
    match object.shape() {
        ObjectShape::Rectangle { .. } => {}
        ObjectShape::Ellipse { .. } => json.ellipse = true,
        ObjectShape::Point => json.point = true,
        ObjectShape::Polygon { points: p } => json.polygon = points(p),
        ObjectShape::Polyline { points: p } => json.polyline = points(p),
        ObjectShape::Tile { value } => json.gid = Some(value.raw()),
    }
    Ok(json)
}

fn layer_to_json(layer: &Layer, map: &Map) -> Result<JsonLayer> {
    let mut json = JsonLayer {
        kind: layer.type_name().to_owned(),
        id: layer.id,
        name: layer.name.clone(),
        visible: layer.visible,
        opacity: layer.opacity(),
        offsetx: layer.offset.x,
        offsety: layer.offset.y,
        x: 0,
        y: 0,
        width: None,
        height: None,
        data: None,
        encoding: None,
        compression: None,
        objects: None,
        draworder: None,
        color: None,
        image: None,
        imagewidth: None,
        imageheight: None,
        transparentcolor: None,
        properties: properties_to_json(&layer.properties),
    };
    match layer.kind() {
        LayerKind::Tiles(tiles) => {
            let (w, h) = tiles.size();
            json.width = Some(w);
            json.height = Some(h);
            json.data = Some(match tiles.format.encoding {
                Encoding::Csv => JsonLayerData::Tiles(tiles.raw_data()),
                Encoding::Base64 => {
                    json.encoding = Some(Encoding::Base64.as_str().to_owned());
                    let compression = tiles.format.compression.as_str();
                    if !compression.is_empty() {
                        json.compression = Some(compression.to_owned());
                    }
                    JsonLayerData::Encoded(codec::encode(&tiles.raw_data(), w as usize, tiles.format)?)
                }
            });
        }
        LayerKind::Objects(group) => {
            json.color = hex(group.color);
            json.draworder = Some(group.draw_order.as_str().to_owned());
            json.objects = Some(
                group
                    .objects()
                    .iter()
                    .map(|o| object_to_json(o, map))
                    .collect::<Result<_>>()?,
            );
        }
        LayerKind::Image(image_layer) => {
            let image = image_layer.image.as_ref();
            json.image = Some(image.map(|i| i.source.clone()).unwrap_or_default());
            json.imagewidth = image.map(Image::width).filter(|w| *w != 0);
            json.imageheight = image.map(Image::height).filter(|h| *h != 0);
            json.transparentcolor = image.and_then(|i| hex(i.trans));
        }
    }
    Ok(json)
}

/// Path to write for an external tileset: relative when it lives under
/// the map's directory.
fn tileset_reference(source: &Path, map_dir: Option<&Path>) -> String {
    let relative = map_dir.and_then(|dir| source.strip_prefix(dir).ok());
    relative
        .unwrap_or(source)
        .to_string_lossy()
        .replace('\\', "/")
}

fn map_to_json(map: &Map, map_dir: Option<&Path>) -> Result<JsonMap> {
    let map_dir: Option<PathBuf> = map_dir.and_then(|d| canonical_path(d).ok());
    let mut tilesets = Vec::with_capacity(map.tilesets().len());
    for tileset in map.tilesets().iter() {
        let firstgid = tileset.first_gid(map)?;
        let ts = tileset.borrow();
        tilesets.push(match &ts.source {
            Some(source) => JsonTilesetEntry::External(JsonTilesetRef {
                firstgid,
                source: tileset_reference(source, map_dir.as_deref()),
            }),
            None => JsonTilesetEntry::Embedded(tileset_to_json(&ts, firstgid)),
        });
    }

    let layers = map
        .layers()
        .iter()
        .map(|layer| layer_to_json(layer, map))
        .collect::<Result<_>>()?;

    Ok(JsonMap {
        kind: "map".to_owned(),
        tiledversion: map.tiled_version.clone(),
        width: map.width(),
        height: map.height(),
        tilewidth: map.tile_size().0,
        tileheight: map.tile_size().1,
        orientation: map.orientation.as_str().to_owned(),
        renderorder: map.render_order.clone(),
        backgroundcolor: hex(map.background_color),
        infinite: false,
        nextobjectid: map.next_object_id,
        nextlayerid: map.next_layer_id,
        staggeraxis: map.stagger_axis.clone(),
        staggerindex: map.stagger_index.clone(),
        hexsidelength: map.hex_side_length,
        layers,
        tilesets,
        properties: properties_to_json(&map.properties),
    })
}

fn to_string<T: Serialize>(value: &T, options: &WriteOptions) -> Result<String> {
    let text = if options.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    text.map_err(|e| MapError::InvalidMap(format!("cannot serialize: {e}")))
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The map as a JSON document. External tileset paths are made relative to
/// the map's `base_path`.
pub fn map_to_string(map: &Map, options: &WriteOptions) -> Result<String> {
    to_string(&map_to_json(map, map.base_path.as_deref())?, options)
}

pub fn save_map(map: &Map, path: &Path, options: &WriteOptions) -> Result<()> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
    let dir = dir.unwrap_or_else(|| Path::new("."));
    let text = to_string(&map_to_json(map, Some(dir))?, options)?;
    write_file(path, &text)?;
    info!(
        "saved map {} ({} layers, {} tilesets)",
        path.display(),
        map.layers().len(),
        map.tilesets().len()
    );
    Ok(())
}

/// Write a tileset to its own file. Does not change the tileset's `source`.
pub fn save_tileset(tileset: &Tileset, path: &Path, options: &WriteOptions) -> Result<()> {
    let text = to_string(&tileset_to_json(tileset, 0), options)?;
    write_file(path, &text)?;
    info!("saved tileset '{}' to {}", tileset.name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TilesetCache;
    use crate::codec::{Compression, DataFormat};
    use crate::loader::json_loader;
    use crate::map::Placement;
    use crate::tile::TileValue;
    use glam::Vec2;

    fn sample_map() -> Map {
        let mut map = Map::new((3, 2), (16, 16));
        map.properties.insert("title", "sample");
        map.tilesets_mut()
            .push(Tileset::image_grid("grid", (16, 16), Image::new("grid.png", (32, 32))))
            .unwrap();
        map.add_tile_layer("ground", Placement::End).unwrap();
        let mut value = TileValue::new(3);
        value.set_flipped_horizontally(true);
        map.set_tile("ground", (1, 1), value).unwrap();
        map.add_object_layer("things", Placement::End).unwrap();
        let obj = {
            let layer = map.layers().get("things").unwrap().as_objects().unwrap();
            layer
                .new_object(ObjectShape::Polygon {
                    points: vec![Vec2::ZERO, Vec2::new(8.0, 0.0), Vec2::new(0.0, 8.0)],
                })
                .with_name("tri")
        };
        map.add_object("things", obj).unwrap();
        map
    }

    #[test]
    fn writes_layer_data_in_the_layer_format() {
        let mut map = sample_map();
        let text = map_to_string(&map, &WriteOptions { pretty: false }).unwrap();
        assert!(text.contains(r#""encoding":"base64""#));
        assert!(text.contains(r#""compression":"zlib""#));

        let ground = map.layers_mut().get_mut("ground").unwrap();
        ground.as_tiles_mut().unwrap().format = DataFormat::CSV;
        let text = map_to_string(&map, &WriteOptions { pretty: false }).unwrap();
        assert!(text.contains(r#""data":[0,0,0,0,2147483651,0]"#));
        assert!(!text.contains("encoding"));

        let ground = map.layers_mut().get_mut("ground").unwrap();
        ground.as_tiles_mut().unwrap().format =
            DataFormat::new(Encoding::Base64, Compression::None).unwrap();
        let text = map_to_string(&map, &WriteOptions { pretty: false }).unwrap();
        assert!(!text.contains("compression"));
    }

    #[test]
    fn written_document_reads_back() {
        let map = sample_map();
        let text = map_to_string(&map, &WriteOptions::default()).unwrap();
        let back = json_loader::parse_map(&text, None, &mut TilesetCache::new()).unwrap();

        assert_eq!(back.size(), (3, 2));
        assert_eq!(back.properties.get_string("title"), Some("sample"));
        assert_eq!(back.tilesets().len(), 1);
        let tile = back.tile("ground", (1, 1)).unwrap();
        assert_eq!(tile.value(), map.tile("ground", (1, 1)).unwrap().value());
        let tri = back.layers().get("things").unwrap().as_objects().unwrap();
        let tri = tri.objects().get("tri").unwrap();
        assert_eq!(tri.objtype(), "polygon");
        assert_eq!(tri.id, 1);
        assert_eq!(back.next_object_id, 2);
    }

    #[test]
    fn external_tilesets_are_written_as_references() {
        let dir = tempfile::tempdir().unwrap();
        let tileset = Tileset::image_grid("ext", (8, 8), Image::new("ext.png", (16, 16)));
        let ts_path = dir.path().join("ext.json");
        save_tileset(&tileset, &ts_path, &WriteOptions::default()).unwrap();

        let mut cache = TilesetCache::new();
        let shared = cache.get_or_load(&ts_path, json_loader::load_tileset).unwrap();
        let mut map = Map::new((1, 1), (8, 8));
        map.tilesets_mut().push(shared).unwrap();

        let map_path = dir.path().join("level.json");
        save_map(&map, &map_path, &WriteOptions::default()).unwrap();
        let text = std::fs::read_to_string(&map_path).unwrap();
        assert!(text.contains(r#""source": "ext.json""#));

        let back = json_loader::load_map(&map_path, &mut cache).unwrap();
        assert!(back.tilesets().get(0).unwrap().ptr_eq(map.tilesets().get(0).unwrap()));
    }

    #[test]
    fn individual_tilesets_keep_their_images() {
        let mut tileset = Tileset::individual("props", (16, 16), 3);
        if let TilesetKind::Individual { images, .. } = &mut tileset.kind {
            images[1] = Some(Image::new("barrel.png", (16, 32)));
        }
        tileset.attributes_mut(2).probability = Some(0.25);
        let json = tileset_to_json(&tileset, 1);
        assert_eq!(json.tilecount, 3);
        assert_eq!(json.tiles.len(), 2);
        assert_eq!(json.tiles[0].image.as_deref(), Some("barrel.png"));
        assert_eq!(json.tiles[1].probability, Some(0.25));

        let back = json_loader::tileset_from_json(json).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.tile_pixel_size(1), (16, 32));
    }
}
