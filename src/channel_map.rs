/*
 Copyright (c) 2024 clone206

 This file is part of st2surround

 st2surround is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 st2surround is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with st2surround. If not, see <https://www.gnu.org/licenses/>.
*/

// Channel allocation maps. Each output setup declares its speakers as
// (id, azimuth) pairs; from those we derive, once per process, a GxG
// grid of per-speaker gains over the soundfield square. The decoder
// only ever does bilinear lookups into the finished grids.

use std::f64::consts::{FRAC_PI_2, PI};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::soundfield::edge_distance;
use crate::MyError;

/// Identifiers for the supported output channels, named front to back,
/// left to right. A setup's channel list fixes the interleaved frame
/// order of the decoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    FrontLeft,
    FrontCenterLeft,
    FrontCenter,
    FrontCenterRight,
    FrontRight,
    SideFrontLeft,
    SideFrontRight,
    SideCenterLeft,
    SideCenterRight,
    SideBackLeft,
    SideBackRight,
    BackLeft,
    BackCenterLeft,
    BackCenter,
    BackCenterRight,
    BackRight,
    Lfe,
}

impl ChannelId {
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::FrontLeft => "front_left",
            ChannelId::FrontCenterLeft => "front_center_left",
            ChannelId::FrontCenter => "front_center",
            ChannelId::FrontCenterRight => "front_center_right",
            ChannelId::FrontRight => "front_right",
            ChannelId::SideFrontLeft => "side_front_left",
            ChannelId::SideFrontRight => "side_front_right",
            ChannelId::SideCenterLeft => "side_center_left",
            ChannelId::SideCenterRight => "side_center_right",
            ChannelId::SideBackLeft => "side_back_left",
            ChannelId::SideBackRight => "side_back_right",
            ChannelId::BackLeft => "back_left",
            ChannelId::BackCenterLeft => "back_center_left",
            ChannelId::BackCenter => "back_center",
            ChannelId::BackCenterRight => "back_center_right",
            ChannelId::BackRight => "back_right",
            ChannelId::Lfe => "lfe",
        }
    }
}

/// The supported output channel setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSetup {
    Stereo,
    Stereo3,
    Stereo5,
    Surround41,
    Surround51,
    Surround61,
    Surround71,
    Surround71Panorama,
    Surround71Tricenter,
    Surround81,
    Surround91DensePanorama,
    Surround91Wrap,
    Surround111DenseWrap,
    Surround131TotalWrap,
    Surround161,
    Legacy,
}

impl ChannelSetup {
    pub const ALL: [ChannelSetup; 16] = [
        ChannelSetup::Stereo,
        ChannelSetup::Stereo3,
        ChannelSetup::Stereo5,
        ChannelSetup::Surround41,
        ChannelSetup::Surround51,
        ChannelSetup::Surround61,
        ChannelSetup::Surround71,
        ChannelSetup::Surround71Panorama,
        ChannelSetup::Surround71Tricenter,
        ChannelSetup::Surround81,
        ChannelSetup::Surround91DensePanorama,
        ChannelSetup::Surround91Wrap,
        ChannelSetup::Surround111DenseWrap,
        ChannelSetup::Surround131TotalWrap,
        ChannelSetup::Surround161,
        ChannelSetup::Legacy,
    ];

    /// The configuration name of this setup.
    pub fn name(self) -> &'static str {
        match self {
            ChannelSetup::Stereo => "cs_stereo",
            ChannelSetup::Stereo3 => "cs_3stereo",
            ChannelSetup::Stereo5 => "cs_5stereo",
            ChannelSetup::Surround41 => "cs_4point1",
            ChannelSetup::Surround51 => "cs_5point1",
            ChannelSetup::Surround61 => "cs_6point1",
            ChannelSetup::Surround71 => "cs_7point1",
            ChannelSetup::Surround71Panorama => "cs_7point1_panorama",
            ChannelSetup::Surround71Tricenter => "cs_7point1_tricenter",
            ChannelSetup::Surround81 => "cs_8point1",
            ChannelSetup::Surround91DensePanorama => "cs_9point1_densepanorama",
            ChannelSetup::Surround91Wrap => "cs_9point1_wrap",
            ChannelSetup::Surround111DenseWrap => "cs_11point1_densewrap",
            ChannelSetup::Surround131TotalWrap => "cs_13point1_totalwrap",
            ChannelSetup::Surround161 => "cs_16point1",
            ChannelSetup::Legacy => "cs_legacy",
        }
    }

    /// Number of output channels, including the LFE when present.
    pub fn num_channels(self) -> usize {
        setup_map(self).channels.len()
    }

    /// Channel identifier at slot `i` of the interleaved output.
    pub fn channel_at(self, i: usize) -> Option<ChannelId> {
        setup_map(self).channels.get(i).copied()
    }

    pub fn channels(self) -> &'static [ChannelId] {
        &setup_map(self).channels
    }

    pub fn has_lfe(self) -> bool {
        setup_map(self).has_lfe
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).unwrap()
    }
}

impl FromStr for ChannelSetup {
    type Err = MyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|cs| cs.name() == s)
            .ok_or_else(|| MyError::Message(format!("Unknown channel setup: {}", s)))
    }
}

/// Which input phase a channel inherits: the left spectrum's, the
/// center mix's, or the right spectrum's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseSource {
    Left,
    Center,
    Right,
}

impl PhaseSource {
    /// Index into the decoder's [left, center, right] phase array.
    pub(crate) fn index(self) -> usize {
        match self {
            PhaseSource::Left => 0,
            PhaseSource::Center => 1,
            PhaseSource::Right => 2,
        }
    }

    fn for_azimuth(az: f64) -> Self {
        if az == 0.0 || az.abs() == 180.0 {
            PhaseSource::Center
        } else if az < 0.0 {
            PhaseSource::Left
        } else {
            PhaseSource::Right
        }
    }
}

/// Grid resolution per axis. Odd, so the axes and the exact center of
/// the soundfield land on grid cells.
pub(crate) const GRID_RES: usize = 17;

/// Fraction of a front-center source's energy kept on the center
/// speaker; the remainder is split between its azimuth neighbors.
const CENTER_KEEP: f64 = 2.0 / 3.0;

pub(crate) struct SetupMap {
    pub channels: Vec<ChannelId>,
    pub phase: Vec<PhaseSource>,
    /// grid[c][q][p]: gain of channel c at soundfield cell (p, q),
    /// p indexing x and q indexing y. All zeros for the LFE.
    pub grid: Vec<[[f64; GRID_RES]; GRID_RES]>,
    pub has_lfe: bool,
}

impl SetupMap {
    /// Channels fed from the allocation grid (everything but the LFE).
    pub fn full_range(&self) -> usize {
        self.channels.len() - self.has_lfe as usize
    }
}

use ChannelId::*;

// Speaker layouts: (id, azimuth in degrees), listed front to back and
// left to right. Azimuth 0 is dead ahead, positive clockwise, +-180
// the rear. The LFE is implied by the `true` flag and sits last.
const LAYOUTS: [(&[(ChannelId, f64)], bool); 16] = [
    // cs_stereo
    (&[(FrontLeft, -45.0), (FrontRight, 45.0)], false),
    // cs_3stereo
    (&[(FrontLeft, -45.0), (FrontCenter, 0.0), (FrontRight, 45.0)], false),
    // cs_5stereo
    (
        &[
            (FrontLeft, -90.0),
            (FrontCenterLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontCenterRight, 45.0),
            (FrontRight, 90.0),
        ],
        false,
    ),
    // cs_4point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontRight, 45.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_5point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontRight, 45.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_6point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontRight, 45.0),
            (SideCenterLeft, -90.0),
            (SideCenterRight, 90.0),
            (BackCenter, 180.0),
        ],
        true,
    ),
    // cs_7point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontRight, 45.0),
            (SideCenterLeft, -90.0),
            (SideCenterRight, 90.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_7point1_panorama
    (
        &[
            (FrontLeft, -90.0),
            (FrontCenterLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontCenterRight, 45.0),
            (FrontRight, 90.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_7point1_tricenter
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenterLeft, -22.5),
            (FrontCenter, 0.0),
            (FrontCenterRight, 22.5),
            (FrontRight, 45.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_8point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenter, 0.0),
            (FrontRight, 45.0),
            (SideCenterLeft, -90.0),
            (SideCenterRight, 90.0),
            (BackLeft, -135.0),
            (BackCenter, 180.0),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_9point1_densepanorama
    (
        &[
            (FrontLeft, -60.0),
            (FrontCenterLeft, -30.0),
            (FrontCenter, 0.0),
            (FrontCenterRight, 30.0),
            (FrontRight, 60.0),
            (SideFrontLeft, -90.0),
            (SideFrontRight, 90.0),
            (BackLeft, -140.0),
            (BackRight, 140.0),
        ],
        true,
    ),
    // cs_9point1_wrap
    (
        &[
            (FrontLeft, -40.0),
            (FrontCenter, 0.0),
            (FrontRight, 40.0),
            (SideFrontLeft, -80.0),
            (SideFrontRight, 80.0),
            (SideBackLeft, -120.0),
            (SideBackRight, 120.0),
            (BackLeft, -160.0),
            (BackRight, 160.0),
        ],
        true,
    ),
    // cs_11point1_densewrap
    (
        &[
            (FrontLeft, -60.0),
            (FrontCenterLeft, -30.0),
            (FrontCenter, 0.0),
            (FrontCenterRight, 30.0),
            (FrontRight, 60.0),
            (SideCenterLeft, -90.0),
            (SideCenterRight, 90.0),
            (SideBackLeft, -120.0),
            (SideBackRight, 120.0),
            (BackLeft, -150.0),
            (BackRight, 150.0),
        ],
        true,
    ),
    // cs_13point1_totalwrap
    (
        &[
            (FrontLeft, -54.0),
            (FrontCenterLeft, -27.0),
            (FrontCenter, 0.0),
            (FrontCenterRight, 27.0),
            (FrontRight, 54.0),
            (SideFrontLeft, -81.0),
            (SideFrontRight, 81.0),
            (SideCenterLeft, -108.0),
            (SideCenterRight, 108.0),
            (SideBackLeft, -135.0),
            (SideBackRight, 135.0),
            (BackLeft, -162.0),
            (BackRight, 162.0),
        ],
        true,
    ),
    // cs_16point1
    (
        &[
            (FrontLeft, -45.0),
            (FrontCenterLeft, -22.5),
            (FrontCenter, 0.0),
            (FrontCenterRight, 22.5),
            (FrontRight, 45.0),
            (SideFrontLeft, -67.5),
            (SideFrontRight, 67.5),
            (SideCenterLeft, -90.0),
            (SideCenterRight, 90.0),
            (SideBackLeft, -112.5),
            (SideBackRight, 112.5),
            (BackLeft, -135.0),
            (BackCenterLeft, -157.5),
            (BackCenter, 180.0),
            (BackCenterRight, 157.5),
            (BackRight, 135.0),
        ],
        true,
    ),
    // cs_legacy: the historical output order (center after the rears)
    (
        &[
            (FrontLeft, -45.0),
            (FrontRight, 45.0),
            (BackLeft, -135.0),
            (BackRight, 135.0),
            (FrontCenter, 0.0),
        ],
        true,
    ),
];

/// The finished allocation map for a setup. Built once per process on
/// first use; read-only afterwards and shared freely.
pub(crate) fn setup_map(setup: ChannelSetup) -> &'static SetupMap {
    static MAPS: OnceLock<Vec<SetupMap>> = OnceLock::new();
    let maps = MAPS.get_or_init(|| ChannelSetup::ALL.iter().map(|&s| build_map(s)).collect());
    &maps[setup.index()]
}

fn build_map(setup: ChannelSetup) -> SetupMap {
    let (speakers, has_lfe) = LAYOUTS[setup.index()];
    let count = speakers.len();

    // Azimuth-sorted view of the layout, radians.
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&i, &j| speakers[i].1.total_cmp(&speakers[j].1));
    let azimuths: Vec<f64> = order.iter().map(|&i| speakers[i].1.to_radians()).collect();
    let center_slot = order
        .iter()
        .position(|&i| speakers[i].0 == FrontCenter);

    let mut channels: Vec<ChannelId> = speakers.iter().map(|&(id, _)| id).collect();
    let mut phase: Vec<PhaseSource> = speakers
        .iter()
        .map(|&(_, az)| PhaseSource::for_azimuth(az))
        .collect();
    let mut grid = vec![[[0.0; GRID_RES]; GRID_RES]; count];

    let step = 2.0 / (GRID_RES - 1) as f64;
    for q in 0..GRID_RES {
        for p in 0..GRID_RES {
            let x = -1.0 + p as f64 * step;
            let y = -1.0 + q as f64 * step;
            let energies = cell_energies(&azimuths, center_slot, x, y);
            for (slot, &e) in energies.iter().enumerate() {
                grid[order[slot]][q][p] = e.sqrt();
            }
        }
    }

    if has_lfe {
        channels.push(Lfe);
        phase.push(PhaseSource::Center);
        grid.push([[0.0; GRID_RES]; GRID_RES]);
    }

    SetupMap {
        channels,
        phase,
        grid,
        has_lfe,
    }
}

/// Per-speaker energies (azimuth order) for one soundfield position.
/// Always sums to 1.
fn cell_energies(azimuths: &[f64], center_slot: Option<usize>, x: f64, y: f64) -> Vec<f64> {
    let count = azimuths.len();
    let ang = f64::atan2(x, y);
    let len = (x * x + y * y).sqrt();
    let radius = (len / edge_distance(ang)).clamp(0.0, 1.0);

    let mut energies = edge_energies(azimuths, ang);

    // A centered source leaks a fixed share into the flanking speakers,
    // the baked-in center image.
    if let Some(c) = center_slot {
        if count >= 3 {
            let e = energies[c];
            let prev = (c + count - 1) % count;
            let next = (c + 1) % count;
            energies[c] = e * CENTER_KEEP;
            energies[prev] += e * (1.0 - CENTER_KEEP) / 2.0;
            energies[next] += e * (1.0 - CENTER_KEEP) / 2.0;
        }
    }

    // Blend toward an even ambient spread at the middle of the field,
    // then renormalize so every cell carries unit energy.
    let ambient = 1.0 / count as f64;
    for e in energies.iter_mut() {
        *e = (1.0 - radius) * ambient + radius * *e;
    }
    let total: f64 = energies.iter().sum();
    for e in energies.iter_mut() {
        *e /= total;
    }
    energies
}

/// Constant-power pan between the two speakers bracketing `ang`.
/// `azimuths` is sorted ascending within (-PI, PI]; the widest gap
/// (through the rear for front-only layouts) wraps around.
fn edge_energies(azimuths: &[f64], ang: f64) -> Vec<f64> {
    let count = azimuths.len();
    let mut energies = vec![0.0; count];
    if count == 1 {
        energies[0] = 1.0;
        return energies;
    }

    let last = count - 1;
    if ang < azimuths[0] || ang >= azimuths[last] {
        let span = azimuths[0] + 2.0 * PI - azimuths[last];
        let pos = if ang >= azimuths[last] {
            ang - azimuths[last]
        } else {
            ang + 2.0 * PI - azimuths[last]
        };
        let (lo, hi) = pan_pair(pos / span);
        energies[last] += lo;
        energies[0] += hi;
    } else {
        for i in 0..last {
            if ang >= azimuths[i] && ang < azimuths[i + 1] {
                let span = azimuths[i + 1] - azimuths[i];
                let (lo, hi) = pan_pair((ang - azimuths[i]) / span);
                energies[i] += lo;
                energies[i + 1] += hi;
                break;
            }
        }
    }
    energies
}

fn pan_pair(t: f64) -> (f64, f64) {
    let c = (t * FRAC_PI_2).cos();
    let s = (t * FRAC_PI_2).sin();
    (c * c, s * s)
}
