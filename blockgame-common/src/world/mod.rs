use crate::{aabb::Aabb, Axis};
use nalgebra::{point, vector, Point3};
use std::{
    collections::{HashMap, HashSet},
    ops::{Index, IndexMut},
    sync::Arc,
};

use self::registry::{NodeId, NodeRegistry};

pub mod registry;

/// World units per node.
pub const BLOCK_SIZE: f32 = 1.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockPos {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Index<Axis> for BlockPos {
    type Output = i16;

    fn index(&self, index: Axis) -> &Self::Output {
        match index {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

impl IndexMut<Axis> for BlockPos {
    fn index_mut(&mut self, index: Axis) -> &mut Self::Output {
        match index {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

impl From<BlockPos> for Point3<i16> {
    fn from(BlockPos { x, y, z }: BlockPos) -> Self {
        point![x, y, z]
    }
}

/// Round a world position to the nearest node index.
pub fn block_pos_at(pos: Point3<f32>) -> BlockPos {
    BlockPos {
        x: (pos.x / BLOCK_SIZE + 0.5).floor() as i16,
        y: (pos.y / BLOCK_SIZE + 0.5).floor() as i16,
        z: (pos.z / BLOCK_SIZE + 0.5).floor() as i16,
    }
}

/// World-space box of one node, centered on the node's position.
pub fn node_box(pos: BlockPos) -> Aabb {
    let center = point![
        pos.x as f32 * BLOCK_SIZE,
        pos.y as f32 * BLOCK_SIZE,
        pos.z as f32 * BLOCK_SIZE
    ];
    let half = vector![BLOCK_SIZE, BLOCK_SIZE, BLOCK_SIZE] / 2.0;
    Aabb {
        min: center - half,
        max: center + half,
    }
}

/// What the terrain knows about one node position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NodeProbe {
    /// A loaded node that entities collide with, and its world-space box.
    Walkable(Aabb),
    /// A loaded node with nothing to collide with.
    NotWalkable,
    /// Position not loaded. Collides like a walkable node so entities
    /// cannot fall out of the world; standing on one is reported
    /// separately.
    Unloaded(Aabb),
}

/// Read-only node lookup consumed by the collision core.
pub trait NodeQuery {
    fn probe(&self, pos: BlockPos) -> NodeProbe;
}

impl<F> NodeQuery for F
where
    F: Fn(BlockPos) -> NodeProbe,
{
    fn probe(&self, pos: BlockPos) -> NodeProbe {
        self(pos)
    }
}

/// Flat node storage over a registry. Positions that were never written
/// read as air; positions can also be explicitly marked unloaded.
#[derive(Clone, Debug, Default)]
pub struct SparseWorld {
    registry: Arc<NodeRegistry>,
    nodes: HashMap<BlockPos, NodeId>,
    unloaded: HashSet<BlockPos>,
}

impl SparseWorld {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            nodes: HashMap::new(),
            unloaded: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn set_node(&mut self, pos: BlockPos, id: NodeId) {
        self.nodes.insert(pos, id);
    }

    pub fn mark_unloaded(&mut self, pos: BlockPos) {
        self.unloaded.insert(pos);
    }

    /// Set every node in the inclusive box `min..=max`.
    pub fn fill(&mut self, min: BlockPos, max: BlockPos, id: NodeId) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.nodes.insert(BlockPos { x, y, z }, id);
                }
            }
        }
    }
}

impl NodeQuery for SparseWorld {
    fn probe(&self, pos: BlockPos) -> NodeProbe {
        if self.unloaded.contains(&pos) {
            return NodeProbe::Unloaded(node_box(pos));
        }
        match self.nodes.get(&pos) {
            Some(&id) if self.registry.walkable(id) => NodeProbe::Walkable(node_box(pos)),
            _ => NodeProbe::NotWalkable,
        }
    }
}
