// tests/load_tests.rs

use anyhow::Result;
use std::fs;
use tmxkit::{
    load_tileset, save_tileset, DataFormat, Image, Map, MapError, Placement, TileValue, Tileset,
    TilesetCache, WriteOptions,
};

const TILESET: &str = r#"{
  "type": "tileset",
  "name": "shared",
  "tilewidth": 4,
  "tileheight": 4,
  "tilecount": 4,
  "columns": 2,
  "image": "shared.png",
  "imagewidth": 8,
  "imageheight": 8
}"#;

#[test]
fn integration_load_from_file_and_str() -> Result<()> {
    let json = r#"
    {
        "width": 1,
        "height": 1,
        "tilewidth": 4,
        "tileheight": 4,
        "layers": [ { "name": "L", "data": [0] } ]
    }
    "#;
    let map = Map::from_json_str(json, None, &mut TilesetCache::new())?;
    assert_eq!(map.width(), 1);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("test_map_integration.json");
    fs::write(&path, json)?;
    let map2 = Map::load(&path)?;
    assert_eq!(map2.tile_size(), (4, 4));
    assert_eq!(map2.base_path.as_deref(), Some(dir.path()));
    Ok(())
}

#[test]
fn integration_unsupported_format() {
    let err = Map::load("foo.tmx").unwrap_err();
    match err {
        MapError::InvalidMap(msg) => assert!(msg.contains("foo.tmx")),
        other => panic!("expected InvalidMap, got {:?}", other),
    }
}

#[test]
fn maps_share_external_tilesets_through_the_cache() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("shared.json"), TILESET)?;
    let level = |n: u32| {
        format!(
            r#"{{"width":1,"height":1,"tilewidth":4,"tileheight":4,
                "layers":[{{"type":"tilelayer","name":"ground","width":1,"height":1,"data":[{n}]}}],
                "tilesets":[{{"firstgid":1,"source":"shared.json"}}]}}"#
        )
    };
    fs::write(dir.path().join("one.json"), level(1))?;
    fs::create_dir(dir.path().join("sub"))?;
    fs::write(
        dir.path().join("sub").join("two.json"),
        level(2).replace("shared.json", "../shared.json"),
    )?;

    let mut cache = TilesetCache::new();
    let one = Map::load_with_cache(dir.path().join("one.json"), &mut cache)?;
    let two = Map::load_with_cache(dir.path().join("sub").join("two.json"), &mut cache)?;
    assert_eq!(cache.len(), 1);
    assert!(one.tilesets().get(0)?.ptr_eq(two.tilesets().get(0)?));

    drop(one);
    assert_eq!(cache.release_unused(), 0);
    drop(two);
    assert_eq!(cache.release_unused(), 1);
    assert!(cache.is_empty());
    Ok(())
}

#[test]
fn saved_map_loads_back_identically() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ts_path = dir.path().join("shared.json");
    fs::write(&ts_path, TILESET)?;

    let mut cache = TilesetCache::new();
    let shared = cache.get_or_load(&ts_path, load_tileset)?;
    let mut map = Map::new((3, 2), (4, 4));
    map.tilesets_mut()
        .push(Tileset::image_grid("local", (4, 4), Image::new("local.png", (4, 4))))?;
    map.tilesets_mut().push(shared.clone())?;
    map.add_tile_layer("csv", Placement::End)?.as_tiles_mut().expect("tile layer").format =
        DataFormat::CSV;
    map.add_tile_layer("packed", Placement::End)?;
    let mut flipped = TileValue::new(5);
    flipped.set_flipped_diagonally(true);
    map.set_tile("csv", (2, 1), flipped)?;
    map.set_tile("packed", (0, 0), TileValue::new(1))?;
    map.properties.insert("difficulty", 3i64);

    let out = dir.path().join("saved.json");
    map.save(&out, &WriteOptions::default())?;
    let back = Map::load_with_cache(&out, &mut cache)?;

    assert_eq!(back.tilesets().len(), 2);
    assert!(back.tilesets().get(1)?.ptr_eq(&shared));
    for name in ["csv", "packed"] {
        let before = map.layers().get(name)?.as_tiles().expect("tile layer");
        let after = back.layers().get(name)?.as_tiles().expect("tile layer");
        assert_eq!(before.raw_data(), after.raw_data());
        assert_eq!(before.format, after.format);
    }
    assert_eq!(back.properties.get_i64("difficulty"), Some(3));
    let tile = back.tile("csv", (2, 1))?;
    assert_eq!(tile.number()?, 3);
    assert_eq!(tile.pixel_size()?, (4, 4));
    Ok(())
}

#[test]
fn tileset_files_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut tileset = Tileset::image_grid("rocks", (8, 8), Image::new("rocks.png", (34, 18)));
    if let tmxkit::TilesetKind::ImageGrid {
        margin, spacing, ..
    } = &mut tileset.kind
    {
        *margin = 1;
        *spacing = 2;
    }
    tileset.tile_offset = (0, 4);
    tileset.attributes_mut(1).properties.insert("solid", true);
    let path = dir.path().join("rocks.json");
    save_tileset(&tileset, &path, &WriteOptions { pretty: false })?;

    let back = load_tileset(&path)?;
    assert_eq!(back.len(), tileset.len());
    assert_eq!(back.tile_offset, (0, 4));
    assert_eq!(back.kind, tileset.kind);
    assert_eq!(back.tile_attributes, tileset.tile_attributes);
    Ok(())
}
