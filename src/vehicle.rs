// ==============================================================================
// vehicle.rs — PARAMS, STATE AND THE STANDARD COMPONENT PIPELINE
// ------------------------------------------------------------------------------
// A Vehicle bundles immutable params, mutable state and a component sequence.
// The standard sequence is:
//
//   CommandResponse   brake / steer / throttle / clutch responses
//   RoadGeometry      raycast or sweep per wheel, road plane + friction
//   [ substep group x N ]
//     Suspension      jounce, compliance, spring/damper, anti-roll bars
//     Tire            directions, slip, grip, sticky state, forces
//     Constraint      suspension limit rows for the physics engine
//     Differential    torque split (engine drive only)
//     Drivetrain      wheel (and engine) speeds
//     RigidBody       chassis force accumulation + integration
//     WheelPose       wheel angle and local pose
//
// Callers may build their own sequence from the same components.
// ==============================================================================

use nalgebra::{Translation3, Unit};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::command::{
    brake_response, direct_throttle_response, steer_response, AckermannParams, CommandResponseParams,
    CommandResponseState, Commands,
};
use crate::connector::{ConstraintHandle, ConstraintRow, ConstraintState};
use crate::context::SimulationContext;
use crate::drivetrain::{
    update_drivetrain, update_drivetrain_differential, DrivetrainInput, DrivetrainParams, DrivetrainState,
};
use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;
use crate::rigid_body::{update_rigid_body, RigidBodyParams, RigidBodyState};
use crate::road::{Plane, RoadGeometryState, RoadQueryFilter, WheelShape};
use crate::schedule::{Component, ComponentSequence, SubstepGroupHandle};
use crate::suspension::{
    anti_roll_force, resolve_suspension_force, spring_damper, update_compliance, update_suspension_state,
    AntiRollBarParams, JounceCalculation, JounceInput, SuspensionComplianceParams, SuspensionComplianceState,
    SuspensionForce, SuspensionForceParams, SuspensionParams, SuspensionState, SuspensionStateCalculationParams,
};
use crate::tire::slip::wheel_rotation;
use crate::tire::{
    compute_tire_force, update_camber, update_directions, update_grip, update_slip, update_speeds, update_sticky,
    TireForceInput, TireForceParams, TireState,
};
use crate::types::{
    AxleDescription, Frame, PerWheel, Pose, Quat, Real, Scale, TransformAndScale, Vec3, MAX_ANTI_ROLL_BARS,
    MAX_AXLES, MAX_BRAKE_COMMANDS, MAX_WHEELS,
};
use crate::wheel::{update_rotation_angle, WheelParams, WheelRigidBody1dState};

// ============================================
// Params
// ============================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    pub name: String,
    pub axle: AxleDescription,
    pub rigid_body: RigidBodyParams,
    pub wheels: PerWheel<WheelParams>,
    pub suspensions: PerWheel<SuspensionParams>,
    pub suspension_state_calc: SuspensionStateCalculationParams,
    pub suspension_compliance: PerWheel<SuspensionComplianceParams>,
    pub suspension_forces: PerWheel<SuspensionForceParams>,
    pub anti_roll_bars: FixedVec<AntiRollBarParams, MAX_ANTI_ROLL_BARS>,
    pub tires: PerWheel<TireForceParams>,
    pub brake_responses: [CommandResponseParams; MAX_BRAKE_COMMANDS],
    pub steer_response: CommandResponseParams,
    pub ackermann: FixedVec<AckermannParams, MAX_AXLES>,
    pub drivetrain: DrivetrainParams,
    pub road_filter: RoadQueryFilter,
    /// Passes of the substep group per update.
    pub substeps: u32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            name: String::from("vehicle"),
            axle: AxleDescription::paired(2),
            rigid_body: RigidBodyParams::default(),
            wheels: [WheelParams::default(); MAX_WHEELS],
            suspensions: [SuspensionParams::default(); MAX_WHEELS],
            suspension_state_calc: SuspensionStateCalculationParams::default(),
            suspension_compliance: [SuspensionComplianceParams::default(); MAX_WHEELS],
            suspension_forces: [SuspensionForceParams::default(); MAX_WHEELS],
            anti_roll_bars: FixedVec::new(),
            tires: [TireForceParams::default(); MAX_WHEELS],
            brake_responses: [CommandResponseParams::default(); MAX_BRAKE_COMMANDS],
            steer_response: CommandResponseParams::default(),
            ackermann: FixedVec::new(),
            drivetrain: DrivetrainParams::default(),
            road_filter: RoadQueryFilter::default(),
            substeps: 4,
        }
    }
}

impl VehicleParams {
    pub fn nb_wheels(&self) -> usize {
        self.axle.nb_wheels()
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(name = %self.name, error = %e, "vehicle params rejected");
                false
            }
        }
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        self.axle.validate()?;
        self.rigid_body.validate()?;
        for w in self.axle.wheel_ids() {
            let i = w as usize;
            self.wheels[i].validate()?;
            self.suspensions[i].validate()?;
            self.suspension_compliance[i].validate()?;
            self.suspension_forces[i].validate()?;
            self.tires[i].validate()?;
        }
        for bar in self.anti_roll_bars.iter() {
            bar.validate(&self.axle)?;
        }
        for brake in &self.brake_responses {
            brake.validate(&self.axle)?;
        }
        self.steer_response.validate(&self.axle)?;
        for ack in self.ackermann.iter() {
            ack.validate(&self.axle)?;
        }
        self.drivetrain.validate(&self.axle)?;
        if self.substeps == 0 {
            return Err(VehicleError::invalid("VehicleParams", "substeps must be >= 1"));
        }
        Ok(())
    }
}

impl TransformAndScale for VehicleParams {
    fn transform_and_scale(&self, src_frame: &Frame, trg_frame: &Frame, src: &Scale, trg: &Scale) -> Self {
        let mut out = self.clone();
        for w in self.axle.wheel_ids() {
            let i = w as usize;
            out.wheels[i] = self.wheels[i].transform_and_scale(src_frame, trg_frame, src, trg);
            out.suspensions[i] = self.suspensions[i].transform_and_scale(src_frame, trg_frame, src, trg);
            out.suspension_compliance[i] =
                self.suspension_compliance[i].transform_and_scale(src_frame, trg_frame, src, trg);
            out.suspension_forces[i] = self.suspension_forces[i].transform_and_scale(src_frame, trg_frame, src, trg);
            out.tires[i] = self.tires[i].transform_and_scale(src_frame, trg_frame, src, trg);
        }
        out.rigid_body = self.rigid_body.transform_and_scale(src_frame, trg_frame, src, trg);
        out.suspension_state_calc = self.suspension_state_calc.transform_and_scale(src_frame, trg_frame, src, trg);
        for (i, brake) in self.brake_responses.iter().enumerate() {
            out.brake_responses[i] = brake.transform_and_scale(src_frame, trg_frame, src, trg);
        }
        out.steer_response = self.steer_response.transform_and_scale(src_frame, trg_frame, src, trg);
        for (i, ack) in self.ackermann.iter().enumerate() {
            out.ackermann[i] = ack.transform_and_scale(src_frame, trg_frame, src, trg);
        }
        out.drivetrain = self.drivetrain.transform_and_scale(src_frame, trg_frame, src, trg);
        out
    }
}

// ============================================
// State
// ============================================

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub commands: Commands,
    pub responses: CommandResponseState,
    pub road: PerWheel<RoadGeometryState>,
    pub suspension: PerWheel<SuspensionState>,
    pub compliance: PerWheel<SuspensionComplianceState>,
    pub suspension_force: PerWheel<SuspensionForce>,
    pub tires: PerWheel<TireState>,
    pub wheels: PerWheel<WheelRigidBody1dState>,
    /// Wheel pose relative to the rigid body.
    pub wheel_local_poses: PerWheel<Pose>,
    pub drivetrain: DrivetrainState,
    pub rigid_body: RigidBodyState,
    pub constraints: ConstraintState,
}

impl VehicleState {
    pub fn new(params: &VehicleParams) -> Self {
        let mut wheel_local_poses = [Pose::identity(); MAX_WHEELS];
        for w in params.axle.wheel_ids() {
            let s = &params.suspensions[w as usize];
            wheel_local_poses[w as usize] =
                Pose::from_parts(Translation3::from(s.wheel_center(0.0).coords), s.wheel_base_rotation());
        }
        Self {
            commands: Commands::default(),
            responses: CommandResponseState::default(),
            road: [RoadGeometryState::default(); MAX_WHEELS],
            suspension: [SuspensionState::default(); MAX_WHEELS],
            compliance: [SuspensionComplianceState::default(); MAX_WHEELS],
            suspension_force: [SuspensionForce::default(); MAX_WHEELS],
            tires: [TireState::default(); MAX_WHEELS],
            wheels: [WheelRigidBody1dState::default(); MAX_WHEELS],
            wheel_local_poses,
            drivetrain: params.drivetrain.initial_state(),
            rigid_body: RigidBodyState::default(),
            constraints: ConstraintState::default(),
        }
    }

    /// Chassis speed along its longitudinal axis.
    pub fn forward_speed(&self, frame: &Frame) -> Real {
        let lng = self.rigid_body.pose.rotation * frame.lng_axis();
        self.rigid_body.linear_velocity.dot(&lng)
    }

    pub fn wheel_world_pose(&self, wheel: u32) -> Pose {
        self.rigid_body.pose * self.wheel_local_poses[wheel as usize]
    }
}

/// What a component sees during an update.
pub struct VehicleData<'a> {
    pub params: &'a VehicleParams,
    pub state: &'a mut VehicleState,
}

// ============================================
// Components
// ============================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleComponent {
    #[default]
    CommandResponse,
    RoadGeometry,
    Differential,
    Suspension,
    Tire,
    Constraint,
    Drivetrain,
    RigidBody,
    WheelPose,
}

impl<'a> Component<VehicleData<'a>> for VehicleComponent {
    fn update(&self, data: &mut VehicleData<'a>, dt: Real, ctx: &SimulationContext<'_>) -> bool {
        let (p, s) = (data.params, &mut *data.state);
        match self {
            VehicleComponent::CommandResponse => command_response(p, s, ctx),
            VehicleComponent::RoadGeometry => road_geometry(p, s, ctx),
            VehicleComponent::Differential => {
                update_drivetrain_differential(&p.drivetrain, &s.commands, p.nb_wheels(), dt, &mut s.drivetrain)
            }
            VehicleComponent::Suspension => suspension(p, s, dt, ctx),
            VehicleComponent::Tire => tires(p, s, dt, ctx),
            VehicleComponent::Constraint => constraints(p, s),
            VehicleComponent::Drivetrain => return drivetrain(p, s, dt),
            VehicleComponent::RigidBody => rigid_body(p, s, dt, ctx),
            VehicleComponent::WheelPose => wheel_poses(p, s, dt, ctx),
        }
        true
    }
}

fn wheel_ids(p: &VehicleParams) -> FixedVec<u32, MAX_WHEELS> {
    let mut ids = FixedVec::new();
    for w in p.axle.wheel_ids() {
        ids.try_push(w);
    }
    ids
}

fn command_response(p: &VehicleParams, s: &mut VehicleState, ctx: &SimulationContext<'_>) {
    let speed = s.forward_speed(&ctx.frame);
    let cmd = s.commands;
    let r = &mut s.responses;

    steer_response(cmd.steer, speed, &p.steer_response, &p.ackermann, &p.axle, &mut r.steer_angle);

    for w in p.axle.wheel_ids() {
        let i = w as usize;
        r.brake_torque[i] = brake_response(&cmd, speed, w, &p.brake_responses);
        r.drive_torque[i] = 0.0;
    }

    match (&p.drivetrain, &s.drivetrain) {
        (DrivetrainParams::Direct(d), _) => {
            let gear = cmd.direct_gear();
            for w in p.axle.wheel_ids() {
                let i = w as usize;
                r.drive_torque[i] = direct_throttle_response(cmd.throttle, gear, speed, w, &d.throttle_response);
                r.actuation[i].drive_applied = r.drive_torque[i] != 0.0;
            }
            r.clutch_strength = 0.0;
        }
        (DrivetrainParams::Engine(e), state) => {
            r.clutch_strength = e.clutch_response.strength(cmd.engine().clutch);
            let (ratio, diff) = match state {
                DrivetrainState::Engine(es) => (es.gearbox.ratio(&e.gearbox), Some(&es.differential)),
                DrivetrainState::Direct(_) => (0.0, None),
            };
            for w in p.axle.wheel_ids() {
                let i = w as usize;
                let connected = diff.is_some_and(|d| d.torque_ratios[i] != 0.0);
                r.actuation[i].drive_applied = cmd.throttle > 0.0 && ratio != 0.0 && connected;
            }
        }
    }

    for w in p.axle.wheel_ids() {
        let i = w as usize;
        r.actuation[i].brake_applied = r.brake_torque[i] > 0.0;
    }
}

fn road_geometry(p: &VehicleParams, s: &mut VehicleState, ctx: &SimulationContext<'_>) {
    let chassis = s.rigid_body.pose;
    for w in p.axle.wheel_ids() {
        let i = w as usize;
        let susp = &p.suspensions[i];
        let wheel = &p.wheels[i];
        let dir = chassis.rotation * susp.travel_dir;
        // Wheel centre at full compression.
        let top = chassis * susp.wheel_center(susp.travel_dist);

        let hit = match p.suspension_state_calc.jounce_calculation {
            JounceCalculation::Raycast => {
                // Start one radius above the wheel so a road above the hub is still seen.
                let origin = top - dir * wheel.radius;
                ctx.road.raycast(&origin, &dir, susp.travel_dist + 2.0 * wheel.radius, &p.road_filter)
            }
            JounceCalculation::Sweep => {
                let rot = chassis.rotation
                    * wheel_rotation(susp, &ctx.frame, s.responses.steer_angle[i], &s.compliance[i]);
                let spin = rot * ctx.frame.lat_axis();
                let orient = Quat::rotation_between(&Vec3::y(), &spin)
                    .unwrap_or_else(|| Quat::from_axis_angle(&Vec3::x_axis(), std::f32::consts::PI));
                let start = Pose::from_parts(Translation3::from(top.coords), orient);
                let shape = WheelShape { radius: wheel.radius, half_width: wheel.half_width };
                ctx.road.sweep(&shape, &start, &dir, susp.travel_dist, &p.road_filter)
            }
        };

        s.road[i] = match hit {
            Some(h) => RoadGeometryState {
                plane: Plane::from_point_normal(&h.point, &h.normal),
                friction: ctx.materials.friction(h.material),
                velocity: h.velocity,
                hit: true,
            },
            None => RoadGeometryState::default(),
        };
    }
}

fn world_wheel_rotation(p: &VehicleParams, s: &VehicleState, i: usize, frame: &Frame) -> Quat {
    s.rigid_body.pose.rotation
        * wheel_rotation(&p.suspensions[i], frame, s.responses.steer_angle[i], &s.compliance[i])
}

fn suspension(p: &VehicleParams, s: &mut VehicleState, dt: Real, ctx: &SimulationContext<'_>) {
    let chassis = s.rigid_body.pose;
    let mut magnitudes = [0.0; MAX_WHEELS];

    for w in p.axle.wheel_ids() {
        let i = w as usize;
        let spin_axis = world_wheel_rotation(p, s, i, &ctx.frame) * ctx.frame.lat_axis();
        let input = JounceInput {
            params: &p.suspensions[i],
            calc: &p.suspension_state_calc,
            wheel_radius: p.wheels[i].radius,
            spin_axis,
            road: &s.road[i],
            chassis: &chassis,
        };
        let was_airborne = s.suspension[i].is_airborne();
        update_suspension_state(&input, dt, &mut s.suspension[i]);
        if was_airborne != s.suspension[i].is_airborne() {
            trace!(wheel = w, airborne = !was_airborne, "wheel contact changed");
        }
        update_compliance(&p.suspension_compliance[i], &p.suspensions[i], s.suspension[i].jounce, &mut s.compliance[i]);
        magnitudes[i] = spring_damper(&p.suspension_forces[i], &s.suspension[i]);
    }

    for bar in p.anti_roll_bars.iter() {
        let (a, b) = (bar.wheel0 as usize, bar.wheel1 as usize);
        let f = anti_roll_force(bar, s.suspension[a].jounce, s.suspension[b].jounce);
        if !s.suspension[a].is_airborne() {
            magnitudes[a] = (magnitudes[a] + f).max(0.0);
        }
        if !s.suspension[b].is_airborne() {
            magnitudes[b] = (magnitudes[b] - f).max(0.0);
        }
    }

    for w in p.axle.wheel_ids() {
        let i = w as usize;
        resolve_suspension_force(
            magnitudes[i],
            &p.suspensions[i],
            &s.compliance[i],
            &s.road[i],
            &chassis,
            s.suspension[i].is_airborne(),
            &mut s.suspension_force[i],
        );
    }
}

fn tires(p: &VehicleParams, s: &mut VehicleState, dt: Real, ctx: &SimulationContext<'_>) {
    let rot = s.rigid_body.pose.rotation;
    for w in p.axle.wheel_ids() {
        let i = w as usize;
        let wheel = &p.wheels[i];
        let road = s.road[i];
        let airborne = s.suspension[i].is_airborne() || !road.hit;
        let actuation = s.responses.actuation[i];
        let wheel_rot = world_wheel_rotation(p, s, i, &ctx.frame);

        let tire = &mut s.tires[i];
        update_directions(&wheel_rot, &ctx.frame, &road, airborne, &mut tire.directions);

        let center = rot * p.suspensions[i].wheel_center(s.suspension[i].jounce).coords;
        let contact_arm = center - road.plane.normal * wheel.radius;
        let contact_velocity = s.rigid_body.point_velocity(&contact_arm);
        update_speeds(&tire.directions, &contact_velocity, &road, &mut tire.speeds);

        let actuated = actuation.brake_applied || actuation.drive_applied;
        update_slip(&tire.speeds, s.wheels[i].rotation_speed, wheel.radius, actuated, &ctx.tire_slip, &mut tire.slip);
        update_camber(&wheel_rot, &ctx.frame, &road, &mut tire.camber);
        update_grip(
            &p.tires[i],
            s.suspension_force[i].normal_force,
            road.friction,
            tire.slip.lng,
            airborne,
            &mut tire.grip,
        );
        update_sticky(&ctx.tire_sticky, &tire.speeds, actuation.drive_applied, airborne, dt, &mut tire.sticky);

        let input = TireForceInput {
            params: &p.tires[i],
            sticky_params: &ctx.tire_sticky,
            directions: &tire.directions,
            speeds: &tire.speeds,
            slip: &tire.slip,
            camber: &tire.camber,
            grip: &tire.grip,
            sticky: &tire.sticky,
            wheel_radius: wheel.radius,
            arm: rot * s.compliance[i].tire_force_app_point,
        };
        let mut force = tire.force;
        compute_tire_force(&input, &mut force);
        tire.force = force;
    }
}

fn constraints(p: &VehicleParams, s: &mut VehicleState) {
    let chassis = s.rigid_body.pose;
    s.constraints.rows.clear();
    for w in p.axle.wheel_ids() {
        let i = w as usize;
        let susp_state = &s.suspension[i];
        if susp_state.is_airborne() || susp_state.overcompression <= 0.0 {
            continue;
        }
        let susp = &p.suspensions[i];
        let local = susp.wheel_center(susp.travel_dist);
        s.constraints.rows.try_push(ConstraintRow {
            wheel: w,
            point: (chassis * local).coords,
            arm: chassis.rotation * local.coords,
            direction: -(chassis.rotation * susp.travel_dir),
            error: susp_state.overcompression,
            bias_velocity: 0.0,
        });
    }
}

fn drivetrain(p: &VehicleParams, s: &mut VehicleState, dt: Real) -> bool {
    let ids = wheel_ids(p);
    let mut tire_torques = [(0.0, 0.0); MAX_WHEELS];
    for &w in ids.iter() {
        let f = &s.tires[w as usize].force;
        tire_torques[w as usize] = (f.wheel_torque, f.wheel_torque_derivative);
    }
    let input = DrivetrainInput {
        wheel_ids: &ids,
        wheels: &p.wheels,
        commands: &s.commands,
        responses: &s.responses,
        tire_torques: &tire_torques,
    };
    update_drivetrain(&p.drivetrain, &input, dt, &mut s.drivetrain, &mut s.wheels)
}

fn rigid_body(p: &VehicleParams, s: &mut VehicleState, dt: Real, ctx: &SimulationContext<'_>) {
    let mut force = Vec3::zeros();
    let mut torque = Vec3::zeros();
    for w in p.axle.wheel_ids() {
        let i = w as usize;
        force += s.suspension_force[i].force + s.tires[i].force.force;
        torque += s.suspension_force[i].torque + s.tires[i].force.torque;
    }
    update_rigid_body(&p.rigid_body, &ctx.rigid_body_update, &ctx.gravity, force, torque, dt, &mut s.rigid_body);
}

fn wheel_poses(p: &VehicleParams, s: &mut VehicleState, dt: Real, ctx: &SimulationContext<'_>) {
    let lat = Unit::new_normalize(ctx.frame.lat_axis());
    for w in p.axle.wheel_ids() {
        let i = w as usize;
        let a = s.responses.actuation[i];
        update_rotation_angle(
            &p.wheels[i],
            s.tires[i].speeds.lng,
            a.brake_applied || a.drive_applied,
            ctx.wheel_angle_threshold_speed,
            dt,
            &mut s.wheels[i],
        );
        let susp = &p.suspensions[i];
        let steer = wheel_rotation(susp, &ctx.frame, s.responses.steer_angle[i], &s.compliance[i]);
        let spin = Quat::from_axis_angle(&lat, s.wheels[i].rotation_angle);
        let center = susp.wheel_center(s.suspension[i].jounce);
        s.wheel_local_poses[i] = Pose::from_parts(Translation3::from(center.coords), steer * spin);
    }
}

// ============================================
// Vehicle
// ============================================

/// CommandResponse and RoadGeometry once per update, then the per-substep
/// stages in one substep group. Differential only for engine drive.
pub fn standard_sequence(params: &VehicleParams) -> (ComponentSequence<VehicleComponent>, Option<SubstepGroupHandle>) {
    let mut seq = ComponentSequence::new();
    seq.add(VehicleComponent::CommandResponse);
    seq.add(VehicleComponent::RoadGeometry);
    let group = seq.begin_substep_group(params.substeps.max(1));
    seq.add(VehicleComponent::Suspension);
    seq.add(VehicleComponent::Tire);
    seq.add(VehicleComponent::Constraint);
    if params.drivetrain.is_engine() {
        seq.add(VehicleComponent::Differential);
    }
    seq.add(VehicleComponent::Drivetrain);
    seq.add(VehicleComponent::RigidBody);
    seq.add(VehicleComponent::WheelPose);
    seq.end_substep_group();
    (seq, group)
}

#[derive(Clone, Debug)]
pub struct Vehicle {
    params: VehicleParams,
    pub state: VehicleState,
    sequence: ComponentSequence<VehicleComponent>,
    substep_group: Option<SubstepGroupHandle>,
    /// Registered with the physics world, if any.
    pub constraint_handle: Option<ConstraintHandle>,
}

impl Vehicle {
    pub fn new(params: VehicleParams) -> Result<Self> {
        let (sequence, group) = standard_sequence(&params);
        let mut v = Self::with_sequence(params, sequence)?;
        v.substep_group = group;
        Ok(v)
    }

    /// A vehicle driven by a caller-built sequence.
    pub fn with_sequence(params: VehicleParams, sequence: ComponentSequence<VehicleComponent>) -> Result<Self> {
        params.validate()?;
        sequence.validate()?;
        info!(name = %params.name, wheels = params.nb_wheels(), components = sequence.len(), "vehicle created");
        let state = VehicleState::new(&params);
        Ok(Self { params, state, sequence, substep_group: None, constraint_handle: None })
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    pub fn set_commands(&mut self, commands: Commands) {
        self.state.commands = commands.sanitized();
    }

    /// Places the chassis. Resets nothing else.
    pub fn set_pose(&mut self, pose: Pose) {
        self.state.rigid_body.pose = pose;
    }

    /// Overwrites chassis kinematics, typically from the physics engine.
    pub fn set_rigid_body_state(&mut self, pose: Pose, linear_velocity: Vec3, angular_velocity: Vec3) {
        let rb = &mut self.state.rigid_body;
        rb.pose = pose;
        rb.linear_velocity = linear_velocity;
        rb.angular_velocity = angular_velocity;
    }

    /// Force and torque (world frame, about the centre of mass) for the next update only.
    pub fn add_external_force(&mut self, force: Vec3, torque: Vec3) {
        self.state.rigid_body.external_force += force;
        self.state.rigid_body.external_torque += torque;
    }

    pub fn set_substeps(&mut self, substeps: u32) -> Result<()> {
        let group = self
            .substep_group
            .ok_or_else(|| VehicleError::invalid("Vehicle", "sequence has no standard substep group"))?;
        self.sequence.set_substeps(group, substeps)?;
        self.params.substeps = substeps;
        Ok(())
    }

    /// Runs the component sequence once. False if a component stopped it.
    pub fn update(&mut self, dt: Real, ctx: &SimulationContext<'_>) -> bool {
        if !(dt > 0.0) {
            debug!(dt, "skipping vehicle update with non-positive dt");
            return true;
        }
        self.state.rigid_body.begin();
        let mut data = VehicleData { params: &self.params, state: &mut self.state };
        let ok = self.sequence.update(&mut data, dt, ctx);
        self.state.rigid_body.external_force = Vec3::zeros();
        self.state.rigid_body.external_torque = Vec3::zeros();
        if !ok {
            warn!(name = %self.params.name, "vehicle update stopped early");
        }
        ok
    }

    /// The world origin moved by `shift`.
    pub fn shift_origin(&mut self, shift: &Vec3) {
        self.state.rigid_body.pose.translation.vector -= shift;
        for w in self.params.axle.wheel_ids() {
            let road = &mut self.state.road[w as usize];
            if road.hit {
                road.plane.d += road.plane.normal.dot(shift);
            }
        }
        for row in self.state.constraints.rows.iter_mut() {
            row.point -= shift;
        }
    }
}
