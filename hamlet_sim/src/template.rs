// Structure templates and the load-once template cache.
//
// A `StructureTemplate` is the immutable shape of a building: bounding
// dimensions plus an ordered list of (relative position, block, state)
// entries. Templates are parsed from JSON in one of two layouts:
//
// Flat: every entry names its block directly:
//   { "size": [3, 2, 3], "category": "house",
//     "blocks": [ { "pos": [0, 0, 0], "block": "minecraft:cobblestone" },
//                 { "pos": [1, 0, 0], "block": "minecraft:oak_stairs",
//                   "state": { "facing": "north" } } ] }
//
// Palette: entries index into a shared palette, the shape vanilla
// structure files use:
//   { "size": [3, 2, 3],
//     "palette": [ { "Name": "minecraft:stone" },
//                  { "Name": "minecraft:oak_log", "Properties": { "axis": "y" } } ],
//     "blocks": [ { "pos": [0, 0, 0], "state": 0 } ] }
//
// Every relative position must lie within `[0, size)` on each axis, or the
// template fails to load. Block order is preserved; the placement scheduler
// builds in exactly this order.
//
// The building category is resolved here, once: an explicit `category`
// field wins, otherwise it is inferred from the template identifier. After
// load the category travels on the template and the `Building`; nothing
// downstream inspects identifier strings.
//
// `TemplateCache` owns template sources (in-memory JSON registrations and an
// optional directory root) and parses each template at most once. It is an
// explicit value owned by `SimState`, not a global.
//
// See also: `rotation.rs` for the transform applied by `world_blocks`,
// `ledger.rs` for `calculate_materials`, `scheduler.rs` for queue seeding.

use crate::building::Aabb;
use crate::error::{BuildError, Missing};
use crate::rotation::{self, Rotation};
use crate::types::{BlockId, BlockState, VoxelCoord};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a building is for. Resolved once at template load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingCategory {
    House,
    Farm,
    Wall,
    Storage,
    Workshop,
    Decoration,
    #[default]
    Other,
}

impl BuildingCategory {
    /// Best-effort category from an identifier such as
    /// `hamlet:buildings/wheat_farm`.
    pub fn infer_from_id(id: &str) -> Self {
        let path = id.rsplit(['/', ':']).next().unwrap_or(id);
        let has = |needles: &[&str]| needles.iter().any(|n| path.contains(n));
        if has(&["farm", "field", "orchard"]) {
            Self::Farm
        } else if has(&["wall", "gate", "tower"]) {
            Self::Wall
        } else if has(&["storage", "warehouse", "granary", "silo"]) {
            Self::Storage
        } else if has(&["smith", "workshop", "mill", "forge"]) {
            Self::Workshop
        } else if has(&["house", "hut", "cottage", "home"]) {
            Self::House
        } else if has(&["statue", "fountain", "garden", "well"]) {
            Self::Decoration
        } else {
            Self::Other
        }
    }
}

/// One block of a structure template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateBlock {
    /// Position relative to the template origin; within `[0, size)`.
    pub pos: VoxelCoord,
    pub block: BlockId,
    pub state: BlockState,
}

/// An immutable, parsed structure definition.
#[derive(Clone, Debug)]
pub struct StructureTemplate {
    pub id: String,
    /// Bounding dimensions (x, y, z).
    pub size: VoxelCoord,
    pub category: BuildingCategory,
    pub blocks: Vec<TemplateBlock>,
}

#[derive(Deserialize)]
struct RawTemplate {
    size: [i32; 3],
    #[serde(default)]
    category: Option<BuildingCategory>,
    #[serde(default)]
    palette: Vec<RawPaletteEntry>,
    blocks: Vec<RawBlock>,
}

#[derive(Deserialize)]
struct RawPaletteEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawBlock {
    pos: [i32; 3],
    #[serde(default)]
    block: Option<String>,
    #[serde(default)]
    state: Option<RawState>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawState {
    Palette(usize),
    Properties(BTreeMap<String, String>),
}

impl StructureTemplate {
    /// Parse a template from JSON. `id` is the identifier the template is
    /// registered under.
    pub fn from_json(id: &str, json: &str) -> Result<Self, BuildError> {
        let raw: RawTemplate =
            serde_json::from_str(json).map_err(|e| BuildError::structure_load(id, e))?;
        let [sx, sy, sz] = raw.size;
        if sx <= 0 || sy <= 0 || sz <= 0 {
            return Err(BuildError::structure_load(
                id,
                format!("size must be positive, got {sx}x{sy}x{sz}"),
            ));
        }
        let size = VoxelCoord::new(sx, sy, sz);

        let mut blocks = Vec::with_capacity(raw.blocks.len());
        for (index, entry) in raw.blocks.into_iter().enumerate() {
            let pos = VoxelCoord::new(entry.pos[0], entry.pos[1], entry.pos[2]);
            let in_bounds = (0..sx).contains(&pos.x)
                && (0..sy).contains(&pos.y)
                && (0..sz).contains(&pos.z);
            if !in_bounds {
                return Err(BuildError::structure_load(
                    id,
                    format!("block {index} at {pos} lies outside size {sx}x{sy}x{sz}"),
                ));
            }
            let (block, state) = match (entry.block, entry.state) {
                (Some(name), Some(RawState::Properties(props))) => {
                    (BlockId::new(name), BlockState(props))
                }
                (Some(name), None) => (BlockId::new(name), BlockState::new()),
                (None, Some(RawState::Palette(i))) => {
                    let Some(p) = raw.palette.get(i) else {
                        return Err(BuildError::structure_load(
                            id,
                            format!("block {index} references missing palette entry {i}"),
                        ));
                    };
                    (BlockId::new(p.name.clone()), BlockState(p.properties.clone()))
                }
                _ => {
                    return Err(BuildError::structure_load(
                        id,
                        format!("block {index} needs either a block name or a palette index"),
                    ));
                }
            };
            blocks.push(TemplateBlock { pos, block, state });
        }
        if blocks.is_empty() {
            return Err(BuildError::structure_load(id, "template has no blocks"));
        }

        Ok(Self {
            id: id.to_owned(),
            size,
            category: raw
                .category
                .unwrap_or_else(|| BuildingCategory::infer_from_id(id)),
            blocks,
        })
    }

    /// Template entries that actually place something.
    pub fn non_air_blocks(&self) -> impl Iterator<Item = &TemplateBlock> {
        self.blocks.iter().filter(|b| !b.block.is_air())
    }

    /// Every template entry paired with its world position, in template order.
    pub fn world_blocks(
        &self,
        anchor: VoxelCoord,
        rotation: Rotation,
    ) -> impl Iterator<Item = (VoxelCoord, &TemplateBlock)> {
        self.blocks
            .iter()
            .map(move |b| (rotation::to_world(b.pos, rotation, anchor), b))
    }

    /// The set of world positions this template occupies. Air entries
    /// occupy nothing.
    pub fn world_positions(&self, anchor: VoxelCoord, rotation: Rotation) -> FxHashSet<VoxelCoord> {
        self.world_blocks(anchor, rotation)
            .filter(|(_, b)| !b.block.is_air())
            .map(|(p, _)| p)
            .collect()
    }

    /// Axis-aligned world bounding box of the placed template.
    pub fn footprint(&self, anchor: VoxelCoord, rotation: Rotation) -> Aabb {
        // Rotating the two extreme corners of the size box is enough: the
        // transform only permutes and negates axes.
        let far = VoxelCoord::new(self.size.x - 1, self.size.y - 1, self.size.z - 1);
        Aabb::from_corners(
            rotation::to_world(VoxelCoord::new(0, 0, 0), rotation, anchor),
            rotation::to_world(far, rotation, anchor),
        )
    }
}

// ---------------------------------------------------------------------------
// Template cache
// ---------------------------------------------------------------------------

/// Load-once cache of parsed templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateCache {
    /// Raw JSON registered directly by the host.
    sources: BTreeMap<String, String>,
    /// Optional directory searched for `<namespace>/<path>.json`.
    root: Option<PathBuf>,
    loaded: BTreeMap<String, Arc<StructureTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Register (or replace) a template's JSON source. Any cached parse of
    /// the same identifier is dropped.
    pub fn register_json(&mut self, id: &str, json: impl Into<String>) {
        self.loaded.remove(id);
        self.sources.insert(id.to_owned(), json.into());
    }

    /// Forget a template entirely, source and parse.
    pub fn remove(&mut self, id: &str) {
        self.loaded.remove(id);
        self.sources.remove(id);
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    /// Fetch a template, parsing it on first use.
    pub fn get(&mut self, id: &str) -> Result<Arc<StructureTemplate>, BuildError> {
        if let Some(t) = self.loaded.get(id) {
            return Ok(Arc::clone(t));
        }
        let json = match self.sources.get(id) {
            Some(json) => json.clone(),
            None => self.read_from_root(id)?,
        };
        let template = Arc::new(StructureTemplate::from_json(id, &json)?);
        tracing::debug!(
            structure = id,
            blocks = template.blocks.len(),
            category = ?template.category,
            "loaded structure template"
        );
        self.loaded.insert(id.to_owned(), Arc::clone(&template));
        Ok(template)
    }

    fn read_from_root(&self, id: &str) -> Result<String, BuildError> {
        let not_found = || BuildError::NotFound(Missing::Structure(id.to_owned()));
        let root = self.root.as_deref().ok_or_else(not_found)?;
        let path = template_path(root, id).ok_or_else(not_found)?;
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(BuildError::structure_load(id, e)),
        }
    }
}

/// Map `namespace:dir/name` to `<root>/namespace/dir/name.json`. Rejects
/// identifiers that would escape the root.
fn template_path(root: &Path, id: &str) -> Option<PathBuf> {
    let (namespace, path) = id.split_once(':').unwrap_or(("", id));
    if path.is_empty() || path.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return None;
    }
    let mut full = root.to_path_buf();
    if !namespace.is_empty() {
        full.push(namespace);
    }
    full.push(format!("{path}.json"));
    Some(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonKind;

    const HUT: &str = r#"{
        "size": [2, 2, 3],
        "blocks": [
            { "pos": [0, 0, 0], "block": "minecraft:cobblestone" },
            { "pos": [1, 0, 0], "block": "minecraft:cobblestone" },
            { "pos": [0, 1, 2], "block": "minecraft:oak_stairs", "state": { "facing": "north" } },
            { "pos": [1, 1, 1], "block": "minecraft:air" }
        ]
    }"#;

    #[test]
    fn flat_template_parses_in_order() {
        let t = StructureTemplate::from_json("hamlet:small_hut", HUT).unwrap();
        assert_eq!(t.size, VoxelCoord::new(2, 2, 3));
        assert_eq!(t.blocks.len(), 4);
        assert_eq!(t.blocks[2].block.as_str(), "minecraft:oak_stairs");
        assert_eq!(t.blocks[2].state.get("facing"), Some("north"));
        assert_eq!(t.non_air_blocks().count(), 3);
        assert_eq!(t.category, BuildingCategory::House);
    }

    #[test]
    fn palette_template_parses() {
        let json = r#"{
            "size": [1, 2, 1],
            "category": "storage",
            "palette": [
                { "Name": "minecraft:stone" },
                { "Name": "minecraft:oak_log", "Properties": { "axis": "x" } }
            ],
            "blocks": [
                { "pos": [0, 0, 0], "state": 0 },
                { "pos": [0, 1, 0], "state": 1 }
            ]
        }"#;
        let t = StructureTemplate::from_json("hamlet:shed", json).unwrap();
        assert_eq!(t.category, BuildingCategory::Storage);
        assert_eq!(t.blocks[1].block.as_str(), "minecraft:oak_log");
        assert_eq!(t.blocks[1].state.get("axis"), Some("x"));
    }

    #[test]
    fn out_of_size_position_is_rejected() {
        let json = r#"{ "size": [1, 1, 1], "blocks": [ { "pos": [1, 0, 0], "block": "minecraft:stone" } ] }"#;
        let err = StructureTemplate::from_json("bad", json).unwrap_err();
        assert_eq!(err.kind(), ReasonKind::StructureLoadFailure);
    }

    #[test]
    fn missing_palette_entry_is_rejected() {
        let json = r#"{ "size": [1, 1, 1], "blocks": [ { "pos": [0, 0, 0], "state": 3 } ] }"#;
        assert!(StructureTemplate::from_json("bad", json).is_err());
    }

    #[test]
    fn category_inference() {
        use BuildingCategory::*;
        assert_eq!(BuildingCategory::infer_from_id("hamlet:wheat_farm"), Farm);
        assert_eq!(BuildingCategory::infer_from_id("hamlet:walls/stone_wall"), Wall);
        assert_eq!(BuildingCategory::infer_from_id("granary"), Storage);
        assert_eq!(BuildingCategory::infer_from_id("hamlet:blacksmith"), Workshop);
        assert_eq!(BuildingCategory::infer_from_id("hamlet:fountain"), Decoration);
        assert_eq!(BuildingCategory::infer_from_id("hamlet:obelisk"), Other);
        // Only the last path segment counts.
        assert_eq!(BuildingCategory::infer_from_id("farms:statue"), Decoration);
    }

    #[test]
    fn footprint_matches_rotated_positions() {
        let t = StructureTemplate::from_json("hut", HUT).unwrap();
        let anchor = VoxelCoord::new(10, 64, -5);
        for rotation in Rotation::ALL {
            let bb = t.footprint(anchor, rotation);
            for pos in t.world_positions(anchor, rotation) {
                assert!(bb.contains(pos), "{pos} outside {bb:?} at {rotation}");
            }
            assert_eq!(bb.volume(), 2 * 2 * 3);
        }
    }

    #[test]
    fn cache_parses_once_and_reregistration_evicts() {
        let mut cache = TemplateCache::new();
        cache.register_json("hut", HUT);
        assert!(!cache.is_loaded("hut"));
        let a = cache.get("hut").unwrap();
        let b = cache.get("hut").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.register_json("hut", "{ not json");
        assert!(!cache.is_loaded("hut"));
        assert_eq!(
            cache.get("hut").unwrap_err().kind(),
            ReasonKind::StructureLoadFailure
        );
    }

    #[test]
    fn unknown_template_is_not_found() {
        let mut cache = TemplateCache::new();
        assert_eq!(cache.get("nope").unwrap_err().kind(), ReasonKind::NotFound);
    }

    #[test]
    fn template_path_layout() {
        let root = Path::new("/data/structures");
        assert_eq!(
            template_path(root, "hamlet:houses/cottage"),
            Some(PathBuf::from("/data/structures/hamlet/houses/cottage.json"))
        );
        assert_eq!(
            template_path(root, "well"),
            Some(PathBuf::from("/data/structures/well.json"))
        );
        assert_eq!(template_path(root, "hamlet:../secrets"), None);
    }
}
