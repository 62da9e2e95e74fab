//! Text wire format shared with the external forecaster.
//!
//! Both directions are UTF-8 text with `;` between sections and `,` between
//! fields.
//!
//! # Outbound: [`TelemetryFrame`]
//!
//! ```text
//! total,shoot,ahead
//! ;px,py,pz,rx,ry,rz,shots,reloads,dry,hits,focus,fx,fy,fz,rpupil,lpupil
//! ;(npc x,y,z,)* (npc visible,)* (npc alive,)*
//! ;(open door visible,)*
//! ;(closed door visible,)*
//! ;robotA visible,robotB visible,ax,ay,az,bx,by,bz
//! ```
//!
//! Positions and rotations are rounded to one decimal place.  A missing gaze
//! focus is sent as `na` at `(-1,-1,-1)`.
//!
//! # Inbound: [`ForecastDatagram`]
//!
//! ```text
//! stamp;x0,x1,..;y0,y1,..;z0,z1,..
//! ```
//!
//! Fewer than [`MIN_FORECAST_SECTIONS`] sections, an unparsable number, or
//! axis lists of different lengths reject the whole datagram.

use std::fmt::Write as _;
use std::str::FromStr;

use thiserror::Error;
use warden_types::{Vec3, WardenError};

use crate::forecast::Trajectory;

pub const SECTION_SEP: char = ';';
pub const FIELD_SEP: char = ',';

/// Minimum number of sections in a valid forecast datagram.
pub const MIN_FORECAST_SECTIONS: usize = 4;

/// Number of sections in a telemetry frame.
pub const TELEMETRY_SECTIONS: usize = 6;

/// Gaze focus token sent when nothing is focused.
pub const NO_FOCUS: &str = "na";

const NO_FOCUS_POSITION: Vec3 = Vec3::new(-1.0, -1.0, -1.0);

/// Round to the one-decimal precision used on the wire.
pub fn round_tenth(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

fn round_vec(v: Vec3) -> Vec3 {
    Vec3::new(round_tenth(v.x), round_tenth(v.y), round_tenth(v.z))
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a datagram was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("expected at least {required} sections, found {found}")]
    TooFewSections { found: usize, required: usize },

    #[error("invalid number {token:?} in section {section}")]
    InvalidNumber { section: usize, token: String },

    #[error("axis lengths differ: x={x}, y={y}, z={z}")]
    AxisLengthMismatch { x: usize, y: usize, z: usize },

    #[error("forecast carries no samples")]
    EmptyTrajectory,

    #[error("section {section} has {found} fields, expected {expected}")]
    FieldCount {
        section: usize,
        found: usize,
        expected: usize,
    },
}

impl From<WireError> for WardenError {
    fn from(e: WireError) -> Self {
        WardenError::Wire(e.to_string())
    }
}

fn parse_num<T: FromStr>(section: usize, token: &str) -> Result<T, WireError> {
    token
        .trim()
        .parse::<T>()
        .map_err(|_| WireError::InvalidNumber {
            section,
            token: token.to_string(),
        })
}

fn parse_flag(section: usize, token: &str) -> Result<bool, WireError> {
    Ok(parse_num::<u8>(section, token)? != 0)
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

/// Comma-terminated run split into its non-empty fields.
fn run_fields(section: &str) -> Vec<&str> {
    section.split(FIELD_SEP).filter(|t| !t.is_empty()).collect()
}

fn exact_fields(section_idx: usize, section: &str, expected: usize) -> Result<Vec<&str>, WireError> {
    let fields: Vec<&str> = section.split(FIELD_SEP).collect();
    if fields.len() != expected {
        return Err(WireError::FieldCount {
            section: section_idx,
            found: fields.len(),
            expected,
        });
    }
    Ok(fields)
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Clock fields at the head of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeInfo {
    /// Seconds since the session started.
    pub total_time: f32,
    /// Seconds since the actor became active.
    pub shoot_time: f32,
    /// Forecast horizon requested from the model, in whole seconds.
    pub time_ahead: u32,
}

/// What the actor is looking at, when eye tracking is available.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeFocus {
    pub name: String,
    pub position: Vec3,
}

/// Actor pose, weapon counters and eye data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerInfo {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub shots_fired: u32,
    pub reloads: u32,
    pub dry_fires: u32,
    pub robot_hits: u32,
    pub focus: Option<GazeFocus>,
    pub right_pupil: f32,
    pub left_pupil: f32,
}

/// One tracked NPC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpcInfo {
    pub position: Vec3,
    /// Visible to the actor.
    pub visible: bool,
    pub alive: bool,
}

/// One pursuit robot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotInfo {
    pub position: Vec3,
    /// Whether this robot currently sees the actor.
    pub sees_actor: bool,
}

/// One outbound world-state snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryFrame {
    pub time: TimeInfo,
    pub player: PlayerInfo,
    pub npcs: Vec<NpcInfo>,
    pub open_doors: Vec<bool>,
    pub closed_doors: Vec<bool>,
    pub robots: [RobotInfo; 2],
}

impl TelemetryFrame {
    /// Copy with every field quantised the way [`encode`][Self::encode]
    /// quantises it.
    pub fn rounded(&self) -> Self {
        let mut f = self.clone();
        f.player.position = round_vec(f.player.position);
        f.player.rotation = round_vec(f.player.rotation);
        if let Some(focus) = f.player.focus.as_mut() {
            focus.position = round_vec(focus.position);
        }
        for npc in &mut f.npcs {
            npc.position = round_vec(npc.position);
        }
        for robot in &mut f.robots {
            robot.position = round_vec(robot.position);
        }
        f
    }

    /// Serialise to the outbound text format.
    ///
    /// Separator characters in the focus name are replaced with `_` so the
    /// frame always splits into the same sections.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(256 + self.npcs.len() * 24);
        let t = &self.time;
        let p = &self.player;

        // write! into a String cannot fail.
        let _ = write!(out, "{},{},{}", t.total_time, t.shoot_time, t.time_ahead);

        out.push(SECTION_SEP);
        push_vec(&mut out, p.position);
        out.push(FIELD_SEP);
        push_vec(&mut out, p.rotation);
        let _ = write!(
            out,
            ",{},{},{},{}",
            p.shots_fired, p.reloads, p.dry_fires, p.robot_hits
        );
        let (focus_name, focus_pos) = match &p.focus {
            Some(f) => (sanitize(&f.name), f.position),
            None => (NO_FOCUS.to_string(), NO_FOCUS_POSITION),
        };
        let _ = write!(out, ",{focus_name},");
        push_vec(&mut out, focus_pos);
        let _ = write!(out, ",{},{}", p.right_pupil, p.left_pupil);

        out.push(SECTION_SEP);
        for npc in &self.npcs {
            push_vec(&mut out, npc.position);
            out.push(FIELD_SEP);
        }
        for npc in &self.npcs {
            let _ = write!(out, "{},", flag(npc.visible));
        }
        for npc in &self.npcs {
            let _ = write!(out, "{},", flag(npc.alive));
        }

        out.push(SECTION_SEP);
        for &v in &self.open_doors {
            let _ = write!(out, "{},", flag(v));
        }

        out.push(SECTION_SEP);
        for &v in &self.closed_doors {
            let _ = write!(out, "{},", flag(v));
        }

        let [a, b] = &self.robots;
        let _ = write!(out, ";{},{},", flag(a.sees_actor), flag(b.sees_actor));
        push_vec(&mut out, a.position);
        out.push(FIELD_SEP);
        push_vec(&mut out, b.position);
        out
    }

    /// Parse the outbound text format, as the forecaster does.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let sections: Vec<&str> = text.split(SECTION_SEP).collect();
        if sections.len() < TELEMETRY_SECTIONS {
            return Err(WireError::TooFewSections {
                found: sections.len(),
                required: TELEMETRY_SECTIONS,
            });
        }

        let tf = exact_fields(0, sections[0], 3)?;
        let time = TimeInfo {
            total_time: parse_num(0, tf[0])?,
            shoot_time: parse_num(0, tf[1])?,
            time_ahead: parse_num(0, tf[2])?,
        };

        let pf = exact_fields(1, sections[1], 16)?;
        let vec_at = |i: usize| -> Result<Vec3, WireError> {
            Ok(Vec3::new(
                parse_num(1, pf[i])?,
                parse_num(1, pf[i + 1])?,
                parse_num(1, pf[i + 2])?,
            ))
        };
        let focus_name = pf[10].trim();
        let focus = if focus_name == NO_FOCUS || focus_name.is_empty() {
            None
        } else {
            Some(GazeFocus {
                name: focus_name.to_string(),
                position: vec_at(11)?,
            })
        };
        let player = PlayerInfo {
            position: vec_at(0)?,
            rotation: vec_at(3)?,
            shots_fired: parse_num(1, pf[6])?,
            reloads: parse_num(1, pf[7])?,
            dry_fires: parse_num(1, pf[8])?,
            robot_hits: parse_num(1, pf[9])?,
            focus,
            right_pupil: parse_num(1, pf[14])?,
            left_pupil: parse_num(1, pf[15])?,
        };

        let nf = run_fields(sections[2]);
        if nf.len() % 5 != 0 {
            return Err(WireError::FieldCount {
                section: 2,
                found: nf.len(),
                expected: nf.len() - nf.len() % 5,
            });
        }
        let n = nf.len() / 5;
        let mut npcs = Vec::with_capacity(n);
        for i in 0..n {
            npcs.push(NpcInfo {
                position: Vec3::new(
                    parse_num(2, nf[3 * i])?,
                    parse_num(2, nf[3 * i + 1])?,
                    parse_num(2, nf[3 * i + 2])?,
                ),
                visible: parse_flag(2, nf[3 * n + i])?,
                alive: parse_flag(2, nf[4 * n + i])?,
            });
        }

        let open_doors = run_fields(sections[3])
            .into_iter()
            .map(|t| parse_flag(3, t))
            .collect::<Result<Vec<_>, _>>()?;
        let closed_doors = run_fields(sections[4])
            .into_iter()
            .map(|t| parse_flag(4, t))
            .collect::<Result<Vec<_>, _>>()?;

        let rf = exact_fields(5, sections[5], 8)?;
        let robots = [
            RobotInfo {
                sees_actor: parse_flag(5, rf[0])?,
                position: Vec3::new(parse_num(5, rf[2])?, parse_num(5, rf[3])?, parse_num(5, rf[4])?),
            },
            RobotInfo {
                sees_actor: parse_flag(5, rf[1])?,
                position: Vec3::new(parse_num(5, rf[5])?, parse_num(5, rf[6])?, parse_num(5, rf[7])?),
            },
        ];

        Ok(Self {
            time,
            player,
            npcs,
            open_doors,
            closed_doors,
            robots,
        })
    }
}

fn push_vec(out: &mut String, v: Vec3) {
    let _ = write!(
        out,
        "{},{},{}",
        round_tenth(v.x),
        round_tenth(v.y),
        round_tenth(v.z)
    );
}

fn sanitize(name: &str) -> String {
    name.replace([SECTION_SEP, FIELD_SEP], "_")
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound forecast
// ────────────────────────────────────────────────────────────────────────────

/// One forecast reply from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDatagram {
    /// Leading section, echoed by the model and otherwise unused.
    pub stamp: String,
    pub trajectory: Trajectory,
}

impl ForecastDatagram {
    /// Parse an inbound datagram.  Sections past the fourth are ignored.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let sections: Vec<&str> = text.split(SECTION_SEP).collect();
        if sections.len() < MIN_FORECAST_SECTIONS {
            return Err(WireError::TooFewSections {
                found: sections.len(),
                required: MIN_FORECAST_SECTIONS,
            });
        }

        let axis = |idx: usize| -> Result<Vec<f32>, WireError> {
            sections[idx]
                .split(FIELD_SEP)
                .map(|t| parse_num::<f32>(idx, t))
                .collect()
        };
        let (xs, ys, zs) = (axis(1)?, axis(2)?, axis(3)?);
        if xs.len() != ys.len() || xs.len() != zs.len() {
            return Err(WireError::AxisLengthMismatch {
                x: xs.len(),
                y: ys.len(),
                z: zs.len(),
            });
        }
        if xs.is_empty() {
            return Err(WireError::EmptyTrajectory);
        }

        let samples = xs
            .into_iter()
            .zip(ys)
            .zip(zs)
            .map(|((x, y), z)| Vec3::new(x, y, z))
            .collect();

        Ok(Self {
            stamp: sections[0].to_string(),
            trajectory: Trajectory::new(samples),
        })
    }

    /// Serialise in the model's reply format (no trailing separators).
    pub fn encode(&self) -> String {
        let join = |f: fn(&Vec3) -> f32| {
            self.trajectory
                .samples()
                .iter()
                .map(|v| f(v).to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{};{};{};{}",
            self.stamp,
            join(|v| v.x),
            join(|v| v.y),
            join(|v| v.z)
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_frame() -> TelemetryFrame {
        TelemetryFrame {
            time: TimeInfo {
                total_time: 12.5,
                shoot_time: 3.25,
                time_ahead: 5,
            },
            player: PlayerInfo {
                position: Vec3::new(655.54, 42.21, 999.38),
                rotation: Vec3::new(0.0, 271.06, 359.96),
                shots_fired: 7,
                reloads: 1,
                dry_fires: 2,
                robot_hits: 0,
                focus: None,
                right_pupil: 0.0,
                left_pupil: 0.0,
            },
            npcs: vec![
                NpcInfo {
                    position: Vec3::new(1.0, 2.0, 3.0),
                    visible: true,
                    alive: true,
                },
                NpcInfo {
                    position: Vec3::new(4.0, 5.0, 6.0),
                    visible: false,
                    alive: false,
                },
            ],
            open_doors: vec![true, false],
            closed_doors: vec![false, false, true],
            robots: [
                RobotInfo {
                    position: Vec3::new(10.0, 0.0, 10.0),
                    sees_actor: true,
                },
                RobotInfo {
                    position: Vec3::new(20.0, 14.0, 20.0),
                    sees_actor: false,
                },
            ],
        }
    }

    #[test]
    fn round_tenth_quantises() {
        assert_eq!(round_tenth(655.54), 655.5);
        assert_eq!(round_tenth(42.25), 42.3);
        assert_eq!(round_tenth(-1.04), -1.0);
    }

    #[test]
    fn encode_matches_layout() {
        let text = sample_frame().encode();
        assert_eq!(
            text,
            "12.5,3.25,5\
             ;655.5,42.2,999.4,0,271.1,360,7,1,2,0,na,-1,-1,-1,0,0\
             ;1,2,3,4,5,6,1,0,1,0,\
             ;1,0,\
             ;0,0,1,\
             ;1,0,10,0,10,20,14,20"
        );
    }

    #[test]
    fn empty_collections_leave_empty_sections() {
        let mut frame = sample_frame();
        frame.npcs.clear();
        frame.open_doors.clear();
        frame.closed_doors.clear();
        let text = frame.encode();
        let sections: Vec<&str> = text.split(';').collect();
        assert_eq!(sections.len(), TELEMETRY_SECTIONS);
        assert_eq!(sections[2], "");
        assert_eq!(sections[3], "");
        assert_eq!(sections[4], "");
        assert_eq!(TelemetryFrame::decode(&text).unwrap(), frame.rounded());
    }

    #[test]
    fn focus_is_sent_and_sanitised() {
        let mut frame = sample_frame();
        frame.player.focus = Some(GazeFocus {
            name: "door;left,1".to_string(),
            position: Vec3::new(1.26, 2.0, 3.0),
        });
        let text = frame.encode();
        assert!(text.contains(",door_left_1,1.3,2,3,"));
        let back = TelemetryFrame::decode(&text).unwrap();
        assert_eq!(back.player.focus.unwrap().name, "door_left_1");
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(matches!(
            TelemetryFrame::decode("1,2,3;a;b"),
            Err(WireError::TooFewSections { found: 3, .. })
        ));
    }

    #[test]
    fn decode_rejects_ragged_npc_run() {
        let text = sample_frame().encode().replacen(";1,2,3,4,5,6,", ";1,2,3,4,5,", 1);
        assert!(matches!(
            TelemetryFrame::decode(&text),
            Err(WireError::FieldCount { section: 2, .. })
        ));
    }

    fn vec3() -> impl Strategy<Value = Vec3> {
        (-2000.0f32..2000.0, -100.0f32..100.0, -2000.0f32..2000.0)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn npc() -> impl Strategy<Value = NpcInfo> {
        (vec3(), any::<bool>(), any::<bool>()).prop_map(|(position, visible, alive)| NpcInfo {
            position,
            visible,
            alive,
        })
    }

    fn frame() -> impl Strategy<Value = TelemetryFrame> {
        (
            (0.0f32..5000.0, 0.0f32..5000.0, 0u32..30),
            (vec3(), vec3(), any::<(u16, u16, u16, u16)>()),
            proptest::option::of((("[a-z_]{1,12}").prop_filter("reserved", |s| s != "na"), vec3())),
            prop::collection::vec(npc(), 0..12),
            prop::collection::vec(any::<bool>(), 0..20),
            prop::collection::vec(any::<bool>(), 0..20),
            (vec3(), any::<bool>(), vec3(), any::<bool>()),
        )
            .prop_map(|(t, p, focus, npcs, open_doors, closed_doors, r)| TelemetryFrame {
                time: TimeInfo {
                    total_time: t.0,
                    shoot_time: t.1,
                    time_ahead: t.2,
                },
                player: PlayerInfo {
                    position: p.0,
                    rotation: p.1,
                    shots_fired: p.2.0.into(),
                    reloads: p.2.1.into(),
                    dry_fires: p.2.2.into(),
                    robot_hits: p.2.3.into(),
                    focus: focus.map(|(name, position)| GazeFocus { name, position }),
                    right_pupil: 3.5,
                    left_pupil: 3.25,
                },
                npcs,
                open_doors,
                closed_doors,
                robots: [
                    RobotInfo {
                        position: r.0,
                        sees_actor: r.1,
                    },
                    RobotInfo {
                        position: r.2,
                        sees_actor: r.3,
                    },
                ],
            })
    }

    proptest! {
        #[test]
        fn telemetry_round_trips_at_tenth_precision(f in frame()) {
            let decoded = TelemetryFrame::decode(&f.encode()).unwrap();
            prop_assert_eq!(decoded, f.rounded());
        }

        #[test]
        fn short_forecasts_are_rejected(parts in prop::collection::vec("[0-9.,]{0,8}", 0..MIN_FORECAST_SECTIONS)) {
            let text = parts.join(";");
            let is_too_few = matches!(
                ForecastDatagram::parse(&text),
                Err(WireError::TooFewSections { .. })
            );
            prop_assert!(is_too_few);
        }
    }

    #[test]
    fn forecast_parse_reads_three_axes() {
        let d = ForecastDatagram::parse("t;1.0,2.0,3.0;4.0,5.0,6.0;7.0,8.0,9.0").unwrap();
        assert_eq!(d.stamp, "t");
        assert_eq!(d.trajectory.len(), 3);
        assert_eq!(d.trajectory.last(), Some(Vec3::new(3.0, 6.0, 9.0)));
        assert_eq!(d.trajectory.samples()[0], Vec3::new(1.0, 4.0, 7.0));
    }

    #[test]
    fn forecast_ignores_extra_sections() {
        let d = ForecastDatagram::parse("0;1;2;3;junk").unwrap();
        assert_eq!(d.trajectory.last(), Some(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn forecast_tolerates_whitespace() {
        let d = ForecastDatagram::parse("0; 1.5 ,2;3, 4 ;5,6\n").unwrap();
        assert_eq!(d.trajectory.last(), Some(Vec3::new(2.0, 4.0, 6.0)));
    }

    #[test]
    fn forecast_rejects_bad_numbers() {
        assert!(matches!(
            ForecastDatagram::parse("t;1,x;2,3;4,5"),
            Err(WireError::InvalidNumber { section: 1, .. })
        ));
        assert!(matches!(
            ForecastDatagram::parse("t;1,2,;2,3,;4,5,"),
            Err(WireError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn forecast_rejects_mismatched_axes() {
        assert_eq!(
            ForecastDatagram::parse("t;1,2,3;4,5;6,7,8"),
            Err(WireError::AxisLengthMismatch { x: 3, y: 2, z: 3 })
        );
    }

    #[test]
    fn forecast_encode_is_parseable() {
        let d = ForecastDatagram {
            stamp: "42.5".to_string(),
            trajectory: Trajectory::new(vec![Vec3::new(1.5, 0.0, -2.0), Vec3::new(3.0, 0.0, -4.0)]),
        };
        let text = d.encode();
        assert_eq!(text, "42.5;1.5,3;0,0;-2,-4");
        assert_eq!(ForecastDatagram::parse(&text).unwrap(), d);
    }

    #[test]
    fn wire_error_converts_to_warden_error() {
        let e: WardenError = WireError::EmptyTrajectory.into();
        assert!(matches!(e, WardenError::Wire(_)));
    }
}
