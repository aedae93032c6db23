//! Serializable per-tick snapshots of vehicles and the world.

use serde::{Deserialize, Serialize};

use crate::drivetrain::DrivetrainState;
use crate::types::Real;
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelSnapshot {
    pub wheel: u32,
    /// World position of the wheel centre.
    pub center: [f32; 3],
    pub grounded: bool,
    pub jounce: Real,
    pub normal_force: Real,
    pub lng_slip: Real,
    pub lat_slip: Real,
    pub lng_force: Real,
    pub lat_force: Real,
    pub rotation_speed: Real,
    pub steer_angle: Real,
    pub sticky: [bool; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: String,
    pub name: String,
    pub position: [f32; 3],
    /// Quaternion as [i, j, k, w].
    pub rotation: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub forward_speed: Real,
    pub engine_rotation_speed: Option<Real>,
    pub gear: Option<u32>,
    pub wheels: Vec<WheelSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub vehicles: Vec<VehicleSnapshot>,
}

impl Vehicle {
    pub fn snapshot(&self, id: &str, frame: &crate::types::Frame) -> VehicleSnapshot {
        let s = &self.state;
        let rb = &s.rigid_body;
        let t = rb.pose.translation.vector;
        let q = rb.pose.rotation.coords;
        let (engine_rotation_speed, gear) = match &s.drivetrain {
            DrivetrainState::Engine(e) => (Some(e.engine.rotation_speed), Some(e.gearbox.current_gear())),
            DrivetrainState::Direct(_) => (None, None),
        };

        let wheels = self
            .params()
            .axle
            .wheel_ids()
            .map(|w| {
                let i = w as usize;
                let c = s.wheel_world_pose(w).translation.vector;
                let tire = &s.tires[i];
                WheelSnapshot {
                    wheel: w,
                    center: [c.x, c.y, c.z],
                    grounded: !s.suspension[i].is_airborne(),
                    jounce: s.suspension[i].jounce,
                    normal_force: s.suspension_force[i].normal_force,
                    lng_slip: tire.slip.lng,
                    lat_slip: tire.slip.lat,
                    lng_force: tire.force.lng_force,
                    lat_force: tire.force.lat_force,
                    rotation_speed: s.wheels[i].rotation_speed,
                    steer_angle: s.responses.steer_angle[i],
                    sticky: tire.sticky.active,
                }
            })
            .collect();

        VehicleSnapshot {
            id: id.to_string(),
            name: self.params().name.clone(),
            position: [t.x, t.y, t.z],
            rotation: [q.x, q.y, q.z, q.w],
            linear_velocity: [rb.linear_velocity.x, rb.linear_velocity.y, rb.linear_velocity.z],
            forward_speed: s.forward_speed(frame),
            engine_rotation_speed,
            gear,
            wheels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use crate::types::Frame;

    #[test]
    fn snapshot_lists_every_wheel() {
        let v = Vehicle::new(presets::engine_drive_car()).unwrap();
        let snap = v.snapshot("car-1", &Frame::default());
        assert_eq!(snap.wheels.len(), 4);
        assert!(snap.gear.is_some());
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"car-1\""));
    }
}
