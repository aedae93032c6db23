// ==============================================================================
// physics.rs — RAPIER WORLD HOSTING THE VEHICLES
// ------------------------------------------------------------------------------
// Per world step:
//
//   1) refresh the query pipeline
//   2) copy chassis pose/velocity from rapier into every vehicle
//   3) update vehicles in parallel; each sees the scene through RapierRoad
//      (shared, read-only borrow of bodies + colliders + query pipeline)
//   4) hand the results back to rapier:
//        Immediate + VelocityChange  -> Δv (minus gravity) added to the body
//        Immediate + Acceleration    -> m·Δv/dt (minus gravity) as a force
//        Deferred                    -> accumulated impulses
//   5) suspension-limit rows from each registered connector become
//      corrective impulses along the suspension axis
//   6) rapier step
//
// The chassis body origin is its centre of mass: mass properties come from
// VehicleParams and the chassis collider has zero density.
// Collider user_data carries the road material id.
// ==============================================================================

use std::collections::HashMap;

use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::parry::shape::Cylinder;
use rapier3d::prelude::*;
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimulationConfig;
use crate::connector::{ConstraintConnector, ConstraintHandle, VehicleConstraintConnector};
use crate::error::Result;
use crate::rigid_body::{ForceApplication, Integration};
use crate::road::{MaterialId, RoadGeometryQuery, RoadHit, RoadQueryFilter, WheelShape};
use crate::telemetry::WorldSnapshot;
use crate::types::{Point3, Pose, Real, Vec3};
use crate::vehicle::{Vehicle, VehicleParams};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

/// Material id of the built-in ground.
pub const GROUND_MATERIAL: MaterialId = 0;

/// Bodies farther out than this (or non-finite) are reset.
const WORLD_LIMIT: Real = 1_000.0;

// ============================================
// Road query over rapier
// ============================================

/// Read-only view of the scene for wheel queries.
pub struct RapierRoad<'a> {
    pub query_pipeline: &'a QueryPipeline,
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
}

impl RapierRoad<'_> {
    fn query_filter(filter: &RoadQueryFilter) -> QueryFilter<'static> {
        QueryFilter::default().groups(InteractionGroups::new(
            Group::from_bits_truncate(filter.memberships),
            Group::from_bits_truncate(filter.filter),
        ))
    }

    fn hit(&self, handle: ColliderHandle, distance: Real, point: Point3, normal: Vec3) -> Option<RoadHit> {
        let collider = self.colliders.get(handle)?;
        let velocity = collider
            .parent()
            .and_then(|b| self.bodies.get(b))
            .map(|b| b.velocity_at_point(&point))
            .unwrap_or_else(Vec3::zeros);
        Some(RoadHit {
            distance,
            point,
            normal: normal.try_normalize(1e-6).unwrap_or_else(Vec3::y),
            material: collider.user_data as MaterialId,
            velocity,
        })
    }
}

impl RoadGeometryQuery for RapierRoad<'_> {
    fn raycast(&self, origin: &Point3, dir: &Vec3, max_dist: Real, filter: &RoadQueryFilter) -> Option<RoadHit> {
        let ray = Ray::new(*origin, *dir);
        let (handle, hit) = self.query_pipeline.cast_ray_and_get_normal(
            self.bodies,
            self.colliders,
            &ray,
            max_dist,
            true,
            Self::query_filter(filter),
        )?;
        self.hit(handle, hit.time_of_impact, ray.point_at(hit.time_of_impact), hit.normal)
    }

    fn sweep(
        &self,
        shape: &WheelShape,
        start: &Pose,
        dir: &Vec3,
        max_dist: Real,
        filter: &RoadQueryFilter,
    ) -> Option<RoadHit> {
        let cylinder = Cylinder::new(shape.half_width, shape.radius);
        let options = ShapeCastOptions::with_max_time_of_impact(max_dist);
        let (handle, hit) = self.query_pipeline.cast_shape(
            self.bodies,
            self.colliders,
            start,
            dir,
            &cylinder,
            options,
            Self::query_filter(filter),
        )?;
        // The pipeline reports witness and normal in world space.
        self.hit(handle, hit.time_of_impact, hit.witness1, hit.normal1.into_inner())
    }
}

// ============================================
// World
// ============================================

pub struct VehicleEntry {
    pub id: Uuid,
    pub body: RigidBodyHandle,
    pub vehicle: Vehicle,
}

pub struct PhysicsWorld {
    pub config: SimulationConfig,
    pub tick: u64,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query_pipeline: QueryPipeline,
    vehicles: Vec<VehicleEntry>,
    connectors: HashMap<ConstraintHandle, VehicleConstraintConnector>,
    next_connector: u64,
}

impl PhysicsWorld {
    /// World with a large static ground box whose top face is at y = 0.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let ground_rb = RigidBodyBuilder::fixed().translation(vector![0.0, -1.0, 0.0]).build();
        let ground_handle = bodies.insert(ground_rb);
        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .user_data(GROUND_MATERIAL as u128)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        info!(bodies = bodies.len(), colliders = colliders.len(), "physics world created");

        Ok(Self {
            config,
            tick: 0,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: Vec::new(),
            connectors: HashMap::new(),
            next_connector: 0,
        })
    }

    /// Static box that wheels can drive over, tagged with `material`.
    pub fn add_static_box(&mut self, half_extents: Vec3, pose: Pose, material: MaterialId) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .position(pose)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .user_data(material as u128)
            .build();
        self.colliders.insert(collider)
    }

    pub fn vehicles(&self) -> &[VehicleEntry] {
        &self.vehicles
    }

    pub fn vehicle_mut(&mut self, id: Uuid) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|e| e.id == id).map(|e| &mut e.vehicle)
    }

    /// Creates the chassis body and registers the vehicle's limit connector.
    pub fn spawn_vehicle(&mut self, mut params: VehicleParams, half_extents: Vec3, pose: Pose) -> Result<Uuid> {
        if params.road_filter == RoadQueryFilter::default() {
            // Wheels must not see their own chassis.
            params.road_filter = RoadQueryFilter { memberships: GROUP_CHASSIS.bits(), filter: GROUP_GROUND.bits() };
        }
        params.substeps = self.config.substeps;
        let mut vehicle = Vehicle::new(params)?;
        vehicle.set_pose(pose);

        let rb = &vehicle.params().rigid_body;
        let body = RigidBodyBuilder::dynamic()
            .position(pose)
            .additional_mass_properties(MassProperties::new(Point3::origin(), rb.mass, rb.moi))
            .ccd_enabled(true)
            .build();
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .active_events(ActiveEvents::empty())
            .density(0.0)
            .friction(0.0)
            .restitution(0.0)
            .build();
        let body = self.bodies.insert(body);
        self.colliders.insert_with_parent(collider, body, &mut self.bodies);

        let handle = ConstraintHandle(self.next_connector);
        self.next_connector += 1;
        self.connectors.insert(handle, VehicleConstraintConnector::new());
        vehicle.constraint_handle = Some(handle);

        let id = Uuid::new_v4();
        info!(%id, name = %vehicle.params().name, ?body, "vehicle spawned");
        self.vehicles.push(VehicleEntry { id, body, vehicle });
        Ok(id)
    }

    /// Removes the vehicle, its body and its connector. False if unknown.
    pub fn despawn_vehicle(&mut self, id: Uuid) -> bool {
        let Some(index) = self.vehicles.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.vehicles.swap_remove(index);
        if let Some(handle) = entry.vehicle.constraint_handle {
            if let Some(mut c) = self.connectors.remove(&handle) {
                c.release();
            }
        }
        self.bodies.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        info!(%id, "vehicle despawned");
        true
    }

    /// Copies rapier's chassis state into each vehicle.
    fn pull_chassis_state(&mut self) {
        for entry in &mut self.vehicles {
            if let Some(body) = self.bodies.get(entry.body) {
                entry.vehicle.set_rigid_body_state(*body.position(), *body.linvel(), *body.angvel());
            }
        }
    }

    /// Runs every vehicle's component sequence against the current scene.
    fn update_vehicles(&mut self, dt: Real) {
        let road = RapierRoad { query_pipeline: &self.query_pipeline, bodies: &self.bodies, colliders: &self.colliders };
        let ctx = self.config.context(&road);
        self.vehicles.par_iter_mut().for_each(|entry| {
            entry.vehicle.update(dt, &ctx);
        });
    }

    /// Hands vehicle results to rapier and loads constraint rows.
    fn push_vehicle_results(&mut self, dt: Real) {
        let gravity = self.config.gravity;
        let mode = self.config.rigid_body_update;
        for entry in &self.vehicles {
            let Some(body) = self.bodies.get_mut(entry.body) else { continue };
            let rb = &entry.vehicle.state.rigid_body;
            match (mode.integration, mode.apply) {
                (Integration::Immediate, ForceApplication::VelocityChange) => {
                    // rapier applies gravity itself.
                    let dv = rb.linear_velocity - rb.previous_linear_velocity - gravity * dt;
                    let dw = rb.angular_velocity - rb.previous_angular_velocity;
                    body.set_linvel(body.linvel() + dv, true);
                    body.set_angvel(body.angvel() + dw, true);
                }
                (Integration::Immediate, ForceApplication::Acceleration) => {
                    let mass = entry.vehicle.params().rigid_body.mass;
                    let accel = (rb.linear_velocity - rb.previous_linear_velocity) / dt - gravity;
                    let alpha = (rb.angular_velocity - rb.previous_angular_velocity) / dt;
                    let inertia = rb.pose.rotation.to_rotation_matrix().matrix()
                        * nalgebra::Matrix3::from_diagonal(&entry.vehicle.params().rigid_body.moi)
                        * rb.pose.rotation.to_rotation_matrix().matrix().transpose();
                    body.reset_forces(false);
                    body.reset_torques(false);
                    body.add_force(accel * mass, true);
                    body.add_torque(inertia * alpha, true);
                }
                (Integration::Deferred, _) => {
                    body.apply_impulse(rb.pending_impulse, true);
                    body.apply_torque_impulse(rb.pending_angular_impulse, true);
                }
            }

            if let Some(c) = entry.vehicle.constraint_handle.and_then(|h| self.connectors.get_mut(&h)) {
                c.load(&entry.vehicle.state.constraints);
            }
        }
    }

    /// Suspension-limit rows as velocity-level impulses.
    fn solve_connectors(&mut self, dt: Real) {
        for entry in &self.vehicles {
            let Some(handle) = entry.vehicle.constraint_handle else { continue };
            let Some(connector) = self.connectors.get_mut(&handle) else { continue };
            let Some(body) = self.bodies.get_mut(entry.body) else { continue };
            let rows = connector.prepare(dt);
            if rows.is_empty() {
                continue;
            }
            // Linear effective mass shared between the active rows.
            let mass = body.mass() / rows.len() as Real;
            for row in rows {
                let point = Point3::from(row.point);
                let vn = body.velocity_at_point(&point).dot(&row.direction);
                if vn < row.bias_velocity {
                    body.apply_impulse_at_point(row.direction * (row.bias_velocity - vn) * mass, point, true);
                }
            }
        }
    }

    fn reset_runaway_bodies(&mut self) {
        for entry in &mut self.vehicles {
            let Some(body) = self.bodies.get_mut(entry.body) else { continue };
            let p = *body.translation();
            if p.iter().all(|c| c.is_finite() && c.abs() <= WORLD_LIMIT) {
                continue;
            }
            let safe = Pose::translation(0.0, 2.0, 0.0);
            body.set_position(safe, true);
            body.set_linvel(Vec3::zeros(), true);
            body.set_angvel(Vec3::zeros(), true);
            entry.vehicle.set_rigid_body_state(safe, Vec3::zeros(), Vec3::zeros());
            warn!(id = %entry.id, position = ?p, "reset runaway vehicle");
        }
    }

    pub fn step(&mut self) {
        let dt = self.config.timestep;
        self.query_pipeline.update(&self.colliders);
        self.pull_chassis_state();
        self.update_vehicles(dt);
        self.push_vehicle_results(dt);
        self.solve_connectors(dt);

        let gravity = self.config.gravity;
        self.pipeline.step(
            &gravity,
            &IntegrationParameters { dt, ..IntegrationParameters::default() },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        self.reset_runaway_bodies();
        self.tick += 1;
    }

    /// Moves the world origin by `shift`: every body and cached world point
    /// is re-expressed relative to the new origin.
    pub fn shift_origin(&mut self, shift: &Vec3) {
        for (_, body) in self.bodies.iter_mut() {
            let mut pos = *body.position();
            pos.translation.vector -= shift;
            body.set_position(pos, false);
        }
        // Attached colliders too, so queries before the next step see the new origin.
        for (_, collider) in self.colliders.iter_mut() {
            let mut pos = *collider.position();
            pos.translation.vector -= shift;
            collider.set_position(pos);
        }
        for entry in &mut self.vehicles {
            entry.vehicle.shift_origin(shift);
        }
        for connector in self.connectors.values_mut() {
            connector.shift_origin(shift);
        }
        debug!(?shift, "world origin shifted");
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            vehicles: self
                .vehicles
                .iter()
                .map(|e| e.vehicle.snapshot(&e.id.to_string(), &self.config.frame))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use approx::assert_relative_eq;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn ground_ray_reports_material_and_normal() {
        let mut w = world();
        w.query_pipeline.update(&w.colliders);
        let road = RapierRoad { query_pipeline: &w.query_pipeline, bodies: &w.bodies, colliders: &w.colliders };
        let filter = RoadQueryFilter { memberships: GROUP_CHASSIS.bits(), filter: GROUP_GROUND.bits() };
        let hit = road.raycast(&Point3::new(0.0, 1.0, 0.0), &-Vec3::y(), 5.0, &filter).unwrap();
        assert_relative_eq!(hit.distance, 1.0, epsilon = 1e-4);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-4);
        assert_eq!(hit.material, GROUND_MATERIAL);
    }

    #[test]
    fn ground_sweep_touches_with_the_rim() {
        let mut w = world();
        w.query_pipeline.update(&w.colliders);
        let road = RapierRoad { query_pipeline: &w.query_pipeline, bodies: &w.bodies, colliders: &w.colliders };
        // Spin axis along world X.
        let start = Pose::from_parts(
            nalgebra::Translation3::new(0.0, 1.0, 0.0),
            nalgebra::UnitQuaternion::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2),
        );
        let shape = WheelShape { radius: 0.35, half_width: 0.1 };
        let filter = RoadQueryFilter { memberships: GROUP_CHASSIS.bits(), filter: GROUP_GROUND.bits() };
        let hit = road.sweep(&shape, &start, &-Vec3::y(), 2.0, &filter).unwrap();
        assert_relative_eq!(hit.distance, 0.65, epsilon = 1e-3);
        assert_relative_eq!(hit.point.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn spawn_and_despawn() {
        let mut w = world();
        let p = presets::direct_drive_car();
        let h = presets::rest_height(&p, 9.81, 0.0);
        let id = w
            .spawn_vehicle(p, Vec3::from(presets::CAR_HALF_EXTENTS), Pose::translation(0.0, h, 0.0))
            .unwrap();
        assert_eq!(w.vehicles().len(), 1);
        assert_eq!(w.connectors.len(), 1);
        for _ in 0..30 {
            w.step();
        }
        let snap = w.snapshot();
        assert_eq!(snap.tick, 30);
        assert!(snap.vehicles[0].wheels.iter().all(|wheel| wheel.grounded));
        assert!(w.despawn_vehicle(id));
        assert!(w.vehicles().is_empty());
        assert!(w.connectors.is_empty());
        assert!(!w.despawn_vehicle(id));
    }
}
