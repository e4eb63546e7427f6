// tests/renumbering_tests.rs

use anyhow::Result;
use tmxkit::{
    resolve, GidLayout, Image, Map, MapError, ObjectShape, Placement, Slice, TileValue, Tileset,
    TilesetKind, TilesetRef,
};

fn grid(name: &str, tiles: u32) -> TilesetRef {
    Tileset::image_grid(name, (16, 16), Image::new(format!("{name}.png"), (16 * tiles, 16))).into()
}

/// 4x1 map with tilesets [A(10), B(5)] and one tile of B placed at (0, 0).
fn two_tileset_map() -> Result<(Map, TilesetRef, TilesetRef)> {
    let mut map = Map::new((4, 1), (16, 16));
    let (a, b) = (grid("A", 10), grid("B", 5));
    map.tilesets_mut().push(a.clone())?;
    map.tilesets_mut().push(b.clone())?;
    map.add_tile_layer("ground", Placement::End)?;
    map.set_tileset_tile("ground", (0, 0), &b.tile(2)?)?;
    map.set_tileset_tile("ground", (1, 0), &a.tile(9)?)?;
    Ok((map, a, b))
}

fn raw(map: &Map) -> Vec<u32> {
    map.layers().get("ground").unwrap().as_tiles().unwrap().raw_data()
}

#[test]
fn moving_a_tileset_keeps_tile_references() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;
    let mut flipped = map.tile("ground", (0, 0))?.value();
    flipped.set_flipped_vertically(true);
    map.set_tile("ground", (0, 0), flipped)?;
    assert_eq!(raw(&map), [0x4000_000D, 10, 0, 0]);

    assert_eq!(map.tilesets_mut().move_item("B", -1)?, 0);

    let tile = map.tile("ground", (0, 0))?;
    let target = tile.tileset_tile()?.expect("tile is set");
    assert!(target.tileset().ptr_eq(&b));
    assert_eq!(target.number(), 2);
    assert!(tile.value().flipped_vertically());
    assert_eq!(raw(&map), [0x4000_0003, 15, 0, 0]);
    assert_eq!(a.first_gid(&map)?, 6);
    Ok(())
}

#[test]
fn removing_a_used_tileset_fails_and_rolls_back() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;
    let before = raw(&map);

    let err = map.tilesets_mut().remove("B").unwrap_err();
    assert!(matches!(err, MapError::UsedTileset { .. }));

    assert_eq!(map.tilesets().len(), 2);
    assert!(map.tilesets().get(0)?.ptr_eq(&a));
    assert!(map.tilesets().get(1)?.ptr_eq(&b));
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn failed_multi_step_edit_restores_everything() -> Result<()> {
    let (mut map, a, _b) = two_tileset_map()?;
    let before = raw(&map);

    let result = map.tilesets_mut().edit(|list| {
        list.move_item("B", -1)?;
        list.remove("A")
    });
    assert!(matches!(result, Err(MapError::UsedTileset { .. })));
    assert!(map.tilesets().get(0)?.ptr_eq(&a));
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn unused_tilesets_can_be_removed() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;
    let c = grid("C", 3);
    map.tilesets_mut().insert(0, c.clone())?;
    assert_eq!(raw(&map), [16, 13, 0, 0]);

    let removed = map.remove_unused_tilesets()?;
    assert_eq!(removed.len(), 1);
    assert!(removed[0].ptr_eq(&c));
    assert_eq!(raw(&map), [13, 10, 0, 0]);

    map.clear_tile("ground", (1, 0))?;
    map.tilesets_mut().remove("A")?;
    assert!(map.tilesets().get(0)?.ptr_eq(&b));
    assert_eq!(raw(&map), [3, 0, 0, 0]);
    assert!(!map.tilesets().contains(&a));
    Ok(())
}

#[test]
fn capacity_guard_leaves_registry_unchanged() -> Result<()> {
    let (mut map, _, _) = two_tileset_map()?;
    let before = raw(&map);
    let huge = Tileset::image_grid("huge", (1, 1), Image::new("huge.png", (0x0FFF_FFFA, 1)));

    let err = map.tilesets_mut().push(huge).unwrap_err();
    assert!(matches!(err, MapError::TooManyTiles { .. }));
    assert_eq!(map.tilesets().len(), 2);
    assert_eq!(map.end_gid(), 15);
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn new_tileset_in_front_shifts_every_gid() -> Result<()> {
    let mut map = Map::new((2, 2), (16, 16));
    map.tilesets_mut().push(grid("A", 3))?;
    map.add_tile_layer("ground", Placement::End)?;
    for (i, gid) in [1, 2, 3].into_iter().enumerate() {
        map.set_tile("ground", (i as i64 % 2, i as i64 / 2), TileValue::new(gid))?;
    }
    assert_eq!(raw(&map), [1, 2, 3, 0]);

    let b = grid("B", 4);
    map.tilesets_mut().push(b.clone())?;
    map.tilesets_mut().move_item("B", -1)?;

    assert_eq!(raw(&map), [5, 6, 7, 0]);
    assert_eq!(b.first_gid(&map)?, 1);
    Ok(())
}

#[test]
fn tile_objects_are_renumbered_too() -> Result<()> {
    let (mut map, _, b) = two_tileset_map()?;
    map.add_object_layer("things", Placement::End)?;
    let obj = {
        let layer = map.layers().get("things")?.as_objects().expect("object layer");
        layer.new_object(ObjectShape::Tile {
            value: TileValue::new(b.tile(4)?.gid(&map)?),
        })
    };
    map.add_object("things", obj)?;

    map.tilesets_mut().move_item("B", -1)?;
    let obj = map.all_objects().next().expect("one object");
    assert_eq!(obj.value(), Some(TileValue::new(5)));
    Ok(())
}

#[test]
fn gids_round_trip_through_resolve() -> Result<()> {
    let mut map = Map::new((1, 1), (16, 16));
    let sets = [grid("A", 10), grid("B", 5), grid("C", 1)];
    for ts in &sets {
        map.tilesets_mut().push(ts.clone())?;
    }
    for ts in &sets {
        for tile in ts.tiles() {
            let gid = tile.gid(&map)?;
            let back = resolve(map.tilesets().as_slice(), gid)?.expect("valid gid");
            assert_eq!(back, tile);
        }
    }
    assert_eq!(resolve(map.tilesets().as_slice(), 0)?, None);
    assert!(resolve(map.tilesets().as_slice(), 17).is_err());
    Ok(())
}

#[test]
fn shared_tileset_changes_reach_other_maps() -> Result<()> {
    let shared = grid("shared", 4);
    let extra = grid("extra", 2);

    let mut first = Map::new((2, 1), (16, 16));
    first.tilesets_mut().push(shared.clone())?;
    first.tilesets_mut().push(extra.clone())?;
    first.add_tile_layer("ground", Placement::End)?;
    first.set_tile("ground", (0, 0), TileValue::new(5))?;

    let mut second = Map::new((2, 1), (16, 16));
    second.tilesets_mut().push(shared.clone())?;
    second.tilesets_mut().push(extra.clone())?;
    second.add_tile_layer("ground", Placement::End)?;
    second.set_tile("ground", (1, 0), TileValue::new(6))?;

    let second_layout = GidLayout::of(second.tilesets().as_slice());
    first.tilesets_mut().modify_tileset("shared", |ts| {
        if let TilesetKind::ImageGrid { image, .. } = &mut ts.kind {
            image.size = (16 * 6, 16);
        }
        Ok(())
    })?;
    second.tilesets_mut().renumber_from(&second_layout)?;

    assert_eq!(shared.len(), 6);
    assert_eq!(first.tile("ground", (0, 0))?.gid(), 7);
    assert_eq!(second.tile("ground", (1, 0))?.gid(), 8);
    assert_eq!(second.tile("ground", (1, 0))?.number()?, 1);
    Ok(())
}

#[test]
fn shrinking_a_used_tileset_is_undone() -> Result<()> {
    let (mut map, a, _) = two_tileset_map()?;
    let before = raw(&map);
    let err = map
        .tilesets_mut()
        .modify_tileset("A", |ts| {
            if let TilesetKind::ImageGrid { image, .. } = &mut ts.kind {
                image.size = (16 * 4, 16);
            }
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, MapError::UsedTileset { .. }));
    assert_eq!(a.len(), 10);
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn replacing_a_used_tileset_fails_and_rolls_back() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;
    let before = raw(&map);

    let err = map.tilesets_mut().set("B", grid("C", 5)).unwrap_err();
    assert!(matches!(err, MapError::UsedTileset { .. }));
    assert!(map.tilesets().get(0)?.ptr_eq(&a));
    assert!(map.tilesets().get(1)?.ptr_eq(&b));
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn deleting_a_slice_with_a_used_tileset_rolls_back() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;
    let c = grid("C", 2);
    map.tilesets_mut().push(c.clone())?;
    let before = raw(&map);

    let err = map
        .tilesets_mut()
        .delete_slice(Slice::new(Some(1), None))
        .unwrap_err();
    assert!(matches!(err, MapError::UsedTileset { .. }));
    assert_eq!(map.tilesets().len(), 3);
    assert!(map.tilesets().get(1)?.ptr_eq(&b));
    assert_eq!(raw(&map), before);

    let removed = map.tilesets_mut().delete_slice(Slice::new(Some(-1), None))?;
    assert!(removed[0].ptr_eq(&c));
    assert!(map.tilesets().get(0)?.ptr_eq(&a));
    assert_eq!(raw(&map), before);
    Ok(())
}

#[test]
fn reordering_through_a_slice_keeps_tile_references() -> Result<()> {
    let (mut map, a, b) = two_tileset_map()?;

    map.tilesets_mut().set_slice(Slice::all(), [b.clone(), a.clone()])?;

    assert!(map.tilesets().get(0)?.ptr_eq(&b));
    assert_eq!(raw(&map), [3, 15, 0, 0]);
    let first = map.tile("ground", (0, 0))?.tileset_tile()?.expect("tile is set");
    assert!(first.tileset().ptr_eq(&b));
    assert_eq!(first.number(), 2);
    let second = map.tile("ground", (1, 0))?.tileset_tile()?.expect("tile is set");
    assert!(second.tileset().ptr_eq(&a));
    assert_eq!(second.number(), 9);
    Ok(())
}
