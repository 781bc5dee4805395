use crate::{
    aabb::Aabb,
    prelude::*,
    world::{block_pos_at, BlockPos, NodeProbe, NodeQuery, BLOCK_SIZE},
    Axis,
};
use nalgebra::{Point3, Vector3};

/// Collision flags accumulated over one frame of motion. Flags only ever
/// latch on; they are OR-merged across sub-steps.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct MoveResult {
    pub touching_ground: bool,
    pub collides: bool,
    pub collides_xz: bool,
    pub standing_on_unloaded: bool,
}

impl MoveResult {
    pub fn merge(&mut self, other: MoveResult) {
        self.touching_ground |= other.touching_ground;
        self.collides |= other.collides;
        self.collides_xz |= other.collides_xz;
        self.standing_on_unloaded |= other.standing_on_unloaded;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct RigidBody {
    pub acceleration: Vector3<f32>,
    pub velocity: Vector3<f32>,
}

#[derive(Copy, Clone, Debug)]
struct NodeBoxEntry {
    aabb: Aabb,
    is_unloaded: bool,
    is_step_up: bool,
}

/// Hard cap on collision resolution rounds within one sub-step.
const RESOLVE_ROUNDS_MAX: u32 = 100;

/// Sweep `moving_box` along `speed` against `static_box`.
///
/// Returns the first axis whose entering plane is crossed and the time of
/// that crossing, or `None` when the boxes never meet. A face that has
/// already penetrated by up to `d` still reports a hit, with a negative
/// time. Axes are tested in X, Y, Z order and the first hit wins.
fn axis_aligned_collision(
    static_box: &Aabb,
    moving_box: &Aabb,
    speed: Vector3<f32>,
    d: f32,
) -> Option<(Axis, f32)> {
    // work in the static box's unit frame so every slab test reads the same
    let size = static_box.dimensions();
    let scale = vector![1.0 / size.x, 1.0 / size.y, 1.0 / size.z];
    let rel_min = (moving_box.min - static_box.min).component_mul(&scale);
    let rel_max = (moving_box.max - static_box.min).component_mul(&scale);
    let rel_speed = speed.component_mul(&scale);

    // perpendicular slab overlap at impact time
    let overlaps = |j: usize, time: f32| {
        rel_min[j] + rel_speed[j] * time < 1.0 && rel_max[j] + rel_speed[j] * time > 0.0
    };

    for axis in Axis::ALL {
        let i = axis.index();
        let (j, k) = ((i + 1) % 3, (i + 2) % 3);

        if rel_speed[i] > 0.0 {
            if rel_max[i] <= d * scale[i] {
                let time = -rel_max[i] / rel_speed[i];
                if overlaps(j, time) && overlaps(k, time) {
                    return Some((axis, time));
                }
            } else if rel_min[i] > 1.0 {
                // already past the far side and separating
                return None;
            }
        } else if rel_speed[i] < 0.0 {
            if rel_min[i] >= 1.0 - d * scale[i] {
                let time = (1.0 - rel_min[i]) / rel_speed[i];
                if overlaps(j, time) && overlaps(k, time) {
                    return Some((axis, time));
                }
            } else if rel_max[i] < 0.0 {
                return None;
            }
        }
    }

    None
}

/// One-sub-step swept collider. Borrows the node-query capability for the
/// duration of a step and owns no terrain state.
pub struct SweptCollider<'w, Q: ?Sized> {
    terrain: &'w Q,
    box_0: Aabb,
    pos_max_d: f32,
    step_height: f32,
}

impl<'w, Q: NodeQuery + ?Sized> SweptCollider<'w, Q> {
    /// `box_0` is the object-local collision box, centered on the origin.
    /// `pos_max_d` bounds the displacement per sub-step; `step_height` is
    /// the vertical tolerance for walking up steps without jumping.
    pub fn new(terrain: &'w Q, box_0: Aabb, pos_max_d: f32, step_height: f32) -> Self {
        Self {
            terrain,
            box_0,
            pos_max_d,
            step_height,
        }
    }

    /// Every walkable or unloaded node whose box could intersect the swept
    /// volume, padded by one node on every side.
    fn collect_node_boxes(
        &self,
        pos: Point3<f32>,
        velocity: Vector3<f32>,
        dtime: f32,
    ) -> Vec<NodeBoxEntry> {
        let oldpos_i = block_pos_at(pos);
        let newpos_i = block_pos_at(pos + velocity * dtime);

        let local = |edge: f32| (edge / BLOCK_SIZE).floor() as i16;
        let min_x = util::min(oldpos_i.x, newpos_i.x) + local(self.box_0.min.x) - 1;
        let min_y = util::min(oldpos_i.y, newpos_i.y) + local(self.box_0.min.y) - 1;
        let min_z = util::min(oldpos_i.z, newpos_i.z) + local(self.box_0.min.z) - 1;
        let max_x = util::max(oldpos_i.x, newpos_i.x) + local(self.box_0.max.x) + 1;
        let max_y = util::max(oldpos_i.y, newpos_i.y) + local(self.box_0.max.y) + 1;
        let max_z = util::max(oldpos_i.z, newpos_i.z) + local(self.box_0.max.z) + 1;

        let mut entries = Vec::new();
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                for z in min_z..=max_z {
                    let (aabb, is_unloaded) = match self.terrain.probe(BlockPos { x, y, z }) {
                        NodeProbe::Walkable(aabb) => (aabb, false),
                        NodeProbe::Unloaded(aabb) => (aabb, true),
                        NodeProbe::NotWalkable => continue,
                    };
                    entries.push(NodeBoxEntry {
                        aabb,
                        is_unloaded,
                        is_step_up: false,
                    });
                }
            }
        }
        entries
    }

    /// Advance `pos` along the body's velocity for `dtime` seconds,
    /// resolving collisions as they come. The caller is expected to keep
    /// `|velocity| * dtime` within `pos_max_d`; `MotionIntegrator` does.
    pub fn step(&self, pos: &mut Point3<f32>, body: &mut RigidBody, mut dtime: f32) -> MoveResult {
        let mut result = MoveResult::default();

        body.velocity += body.acceleration * dtime;

        let mut node_boxes = self.collect_node_boxes(*pos, body.velocity, dtime);

        // collision uncertainty radius, a bit larger than the maximum
        // distance of movement per sub-step
        let d = self.pos_max_d * 1.1;
        debug_assert!(d > self.pos_max_d);

        let mut rounds = 0;
        while dtime > BLOCK_SIZE * 1e-10 {
            if rounds == RESOLVE_ROUNDS_MAX {
                log::warn!(
                    "collision resolution did not converge, discarding {}s of motion",
                    dtime
                );
                break;
            }
            rounds += 1;

            // resolve against the nearest box first; the sort is stable, so
            // equally distant boxes keep discovery order
            let origin = *pos;
            node_boxes.sort_by(|a, b| {
                a.aabb
                    .manhattan_distance(origin)
                    .total_cmp(&b.aabb.manhattan_distance(origin))
            });

            let moving_box = self.box_0.translated(pos.coords);

            let mut hit = None;
            for (index, entry) in node_boxes.iter().enumerate() {
                if entry.is_step_up {
                    continue;
                }
                if let Some((axis, time)) =
                    axis_aligned_collision(&entry.aabb, &moving_box, body.velocity, d)
                {
                    if time <= dtime {
                        hit = Some((index, axis, time));
                        break;
                    }
                }
            }

            let (index, axis, t_hit) = match hit {
                Some(hit) => hit,
                None => {
                    *pos += body.velocity * dtime;
                    break;
                }
            };

            let entry = &mut node_boxes[index];
            if axis != Axis::Y && moving_box.min.y + self.step_height > entry.aabb.max.y {
                // low enough to walk onto; the ground pass lifts the body
                entry.is_step_up = true;
                continue;
            }

            if t_hit < 0.0 {
                // already overlapping by up to `d`; push back out along the
                // collision axis without consuming time
                pos[axis.index()] += body.velocity[axis.index()] * t_hit;
            } else {
                *pos += body.velocity * t_hit;
                dtime -= t_hit;
            }

            body.velocity[axis.index()] = 0.0;
            result.collides = true;
            if axis.is_horizontal() {
                result.collides_xz = true;
            }
        }

        // ground pass: a node supports the object when their X-Z footprints
        // overlap beyond the uncertainty radius and the node's top is flush
        // with the object's bottom
        let mut moving_box = self.box_0.translated(pos.coords);
        for entry in &node_boxes {
            let nb = &entry.aabb;
            if nb.max.x - d <= moving_box.min.x
                || nb.min.x + d >= moving_box.max.x
                || nb.max.z - d <= moving_box.min.z
                || nb.min.z + d >= moving_box.max.z
            {
                continue;
            }
            if entry.is_step_up {
                pos.y += nb.max.y - moving_box.min.y;
                moving_box = self.box_0.translated(pos.coords);
            }
            if (nb.max.y - moving_box.min.y).abs() < 0.15 * BLOCK_SIZE {
                result.touching_ground = true;
                if entry.is_unloaded {
                    result.standing_on_unloaded = true;
                }
            }
        }

        result
    }
}

/// Sub-stepping wrapper around [`SweptCollider`]: splits one frame of
/// motion so that no single collision step moves the body further than
/// `pos_max_d`.
pub struct MotionIntegrator<'w, Q: ?Sized> {
    collider: SweptCollider<'w, Q>,
}

impl<'w, Q: NodeQuery + ?Sized> MotionIntegrator<'w, Q> {
    pub fn new(terrain: &'w Q, box_0: Aabb, pos_max_d: f32, step_height: f32) -> Self {
        Self {
            collider: SweptCollider::new(terrain, box_0, pos_max_d, step_height),
        }
    }

    pub fn advance(&self, pos: &mut Point3<f32>, body: &mut RigidBody, dtime: f32) -> MoveResult {
        // don't allow overly huge frame times
        let mut remaining = util::min(dtime, 2.0);
        let mut result = MoveResult::default();

        while remaining > 0.001 {
            // time = distance / speed, capped at 10ms
            let speed = body.velocity.norm();
            let mut dt_max = if speed > 0.0 {
                self.collider.pos_max_d / speed
            } else {
                1.0
            };
            dt_max = util::min(dt_max, 0.01);

            let dt_part = if remaining > dt_max {
                remaining -= dt_max;
                dt_max
            } else {
                // explicit zero; subtracting epsilon-sized remainders would
                // spin this loop forever
                let part = remaining;
                remaining = 0.0;
                part
            };

            result.merge(self.collider.step(pos, body, dt_part));
        }

        result
    }
}
