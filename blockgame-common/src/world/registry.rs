use crate::prelude::*;
use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

pub const AIR: NodeId = NodeId(0);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct NodeId(pub(crate) usize);

#[derive(Clone, Debug, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
pub struct NodeProperties {
    walkable: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeDescription {
    name: String,
    #[serde(default)]
    properties: NodeProperties,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RegistryManifest {
    nodes: Vec<NodeDescription>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct NodeRegistry {
    name_map: HashMap<String, NodeId>,
    entries: Vec<NodeProperties>,
}

pub fn load_registry<P: AsRef<Path>>(path: P) -> Result<Arc<NodeRegistry>> {
    build_registry(serde_json::from_reader(File::open(path)?)?)
}

pub fn parse_registry(json: &str) -> Result<Arc<NodeRegistry>> {
    build_registry(serde_json::from_str(json)?)
}

fn build_registry(manifest: RegistryManifest) -> Result<Arc<NodeRegistry>> {
    let mut registry = NodeRegistry::default();

    // id 0 is always air and never walkable
    registry.name_map.insert("air".into(), AIR);
    registry.entries.push(NodeProperties::default());

    for node in manifest.nodes {
        if registry.name_map.contains_key(&node.name) {
            bail!("duplicate node definition: {}", node.name);
        }
        let id = NodeId(registry.entries.len());
        registry.name_map.insert(node.name, id);
        registry.entries.push(node.properties);
    }

    Ok(Arc::new(registry))
}

impl NodeRegistry {
    pub fn get_id(&self, name: &str) -> NodeId {
        self.name_map[name]
    }

    #[inline(always)]
    pub fn walkable(&self, id: NodeId) -> bool {
        self.entries[id.0].walkable
    }
}
