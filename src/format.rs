// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame formats and the plane layout rule used to size data terminals.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of planes described by a frame descriptor.
pub const N_FRAME_PLANES: usize = 6;

/// Column (width) dimension index.
pub const COL: usize = 0;

/// Row (height) dimension index.
pub const ROW: usize = 1;

/// Frame and data formats understood by the program group manifest.
///
/// The discriminant is the wire value stored in frame descriptors and the
/// bit position in a manifest's supported-format bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum FrameFormat {
    CustomNoDescriptor = 0,
    Custom,
    /// 12 bit YUV 411, Y and UV planes
    Nv11,
    /// YUV 4:2:0, three planes
    Yuv420,
    /// YUV 4:2:0, Y, V and U planes
    Yv12,
    /// YUV 4:2:0 semi-planar
    Nv12,
    Nv12_16,
    /// NV12 in TileY layout
    Nv12TileY,
    Nv21,
    Yuv422,
    Yv16,
    Nv16,
    Nv61,
    /// YUV 4:2:2 packed UYVY
    Uyvy,
    /// YUV 4:2:2 packed YUYV
    Yuyv,
    Yuv444,
    /// 8 bit monochrome
    Y800,
    Rgb565,
    /// 24 bit RGB, three planes
    Rgb888,
    Rgba888,
    BayerGrbg,
    BayerRggb,
    BayerBggr,
    BayerGbrg,
    /// NV12 derived 3-line format (M420)
    Yuv420Line,
    Raw,
    RawPacked,
    Qplane6,
    Binary8,
    Mipi,
    MipiYuv420_8,
    MipiYuv420_10,
    MipiLegacyYuv420_8,
    GenericParameter,
    DvsParameter,
    DvsCoordinates,
    DpcParameter,
    LscParameter,
    S3aStatisticsHi,
    S3aStatisticsLo,
    S3aHistogram,
    GammastarGrid,
    BayerLineInterleaved,
    BayerVectorized,
    /// Bayer with each colour channel in its own plane
    BayerPlanar,
    BayerGrbgVectorized,
    Yuv420Vectorized,
    YyuvyyVectorized,
    Nv12TileYf,
    /// 10 bit NV12-like, LSB aligned
    P010,
    P010Msb,
    P016,
    P016Msb,
    P010TileY,
    P010MsbTileY,
    P016TileY,
    P016MsbTileY,
    P010TileYf,
    P010MsbTileYf,
    P016TileYf,
    P016MsbTileYf,
    PafNonInterleaved,
    PafInterleaved,
    /// Infra-red raw
    Ir,
    P012Msb,
    Nv12Tile,
    P010Tile,
    P012Tile,
}

use FrameFormat::*;

const ALL_FORMATS: [FrameFormat; 68] = [
    CustomNoDescriptor,
    Custom,
    Nv11,
    Yuv420,
    Yv12,
    Nv12,
    Nv12_16,
    Nv12TileY,
    Nv21,
    Yuv422,
    Yv16,
    Nv16,
    Nv61,
    Uyvy,
    Yuyv,
    Yuv444,
    Y800,
    Rgb565,
    Rgb888,
    Rgba888,
    BayerGrbg,
    BayerRggb,
    BayerBggr,
    BayerGbrg,
    Yuv420Line,
    Raw,
    RawPacked,
    Qplane6,
    Binary8,
    Mipi,
    MipiYuv420_8,
    MipiYuv420_10,
    MipiLegacyYuv420_8,
    GenericParameter,
    DvsParameter,
    DvsCoordinates,
    DpcParameter,
    LscParameter,
    S3aStatisticsHi,
    S3aStatisticsLo,
    S3aHistogram,
    GammastarGrid,
    BayerLineInterleaved,
    BayerVectorized,
    BayerPlanar,
    BayerGrbgVectorized,
    Yuv420Vectorized,
    YyuvyyVectorized,
    Nv12TileYf,
    P010,
    P010Msb,
    P016,
    P016Msb,
    P010TileY,
    P010MsbTileY,
    P016TileY,
    P016MsbTileY,
    P010TileYf,
    P010MsbTileYf,
    P016TileYf,
    P016MsbTileYf,
    PafNonInterleaved,
    PafInterleaved,
    Ir,
    P012Msb,
    Nv12Tile,
    P010Tile,
    P012Tile,
];

/// How the planes of a frame follow each other in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneRule {
    /// One packed or raw plane.
    Single,
    /// Luma plane followed by an interleaved chroma plane.
    SemiPlanar,
    /// As [`PlaneRule::SemiPlanar`] with the luma height padded to a TileY
    /// row of 32 lines.
    SemiPlanarTileY,
    /// Three full size planes.
    Planar,
    /// Full size luma followed by two quarter size chroma planes.
    Planar420,
    /// Four quarter size Bayer channel planes.
    BayerPlanar,
}

/// Plane count and byte offsets of each plane from the frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    pub count: u32,
    pub offsets: [u32; N_FRAME_PLANES],
}

const TILEY_ROWS: usize = 32;

impl FrameFormat {
    /// Wire value of the format.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Bit of this format in a supported-format bitmap, if it fits in 64
    /// bits.
    pub const fn bit(self) -> Option<u64> {
        let raw = self as u32;
        if raw < u64::BITS {
            Some(1 << raw)
        } else {
            None
        }
    }

    /// Build a supported-format bitmap from a list of formats. Formats that
    /// do not fit the bitmap are skipped.
    pub fn bitmap<'a, I: IntoIterator<Item = &'a FrameFormat>>(formats: I) -> u64 {
        formats
            .into_iter()
            .filter_map(|f| f.bit())
            .fold(0, |acc, bit| acc | bit)
    }

    /// The plane rule for this format, or `None` when the layout of the
    /// format is not described.
    pub const fn plane_rule(self) -> Option<PlaneRule> {
        match self {
            Uyvy | Yuyv | Yuv420Line | Y800 | Rgb565 | Rgba888 | BayerGrbg | BayerRggb
            | BayerBggr | BayerGbrg | Raw | RawPacked | YyuvyyVectorized | PafNonInterleaved
            | PafInterleaved | Ir => Some(PlaneRule::Single),
            Nv12 | Nv21 | Nv16 | Nv61 | P010 | P010Msb | P016 | P016Msb | P012Msb => {
                Some(PlaneRule::SemiPlanar)
            }
            P010TileY | P016TileY | P016MsbTileY | P010MsbTileY | Nv12TileY => {
                Some(PlaneRule::SemiPlanarTileY)
            }
            Yuv444 | Rgb888 | Yuv420Vectorized => Some(PlaneRule::Planar),
            Yuv420 | Yv12 => Some(PlaneRule::Planar420),
            BayerPlanar => Some(PlaneRule::BayerPlanar),
            _ => None,
        }
    }
}

impl PlaneRule {
    /// Compute plane offsets for a frame with the given row stride in bytes
    /// and height in rows.
    ///
    /// Fails with [`Error::Overflow`] when a plane offset does not fit the
    /// 32-bit offset field of a frame descriptor.
    ///
    /// # Example
    ///
    /// ```
    /// use edgefirst_psys::format::{FrameFormat, PlaneRule};
    ///
    /// let rule = FrameFormat::Nv12.plane_rule().unwrap();
    /// let layout = rule.layout(64, 32).unwrap();
    /// assert_eq!(layout.count, 2);
    /// assert_eq!(&layout.offsets[..2], &[0, 64 * 32]);
    ///
    /// let rgb = FrameFormat::Rgb888.plane_rule().unwrap();
    /// assert!(rgb.layout(1 << 20, 4096).is_err());
    /// ```
    pub fn layout(self, stride: u32, rows: u16) -> Result<PlaneLayout> {
        let s = stride as u64;
        let r = rows as u64;
        let full = s * r;
        let quarter = (s / 2) * r / 2;
        let tiled = s * crate::blob::ceil_mul(rows as usize, TILEY_ROWS) as u64;

        let steps: &[u64] = match self {
            PlaneRule::Single => &[],
            PlaneRule::SemiPlanar => &[full],
            PlaneRule::SemiPlanarTileY => &[tiled],
            PlaneRule::Planar => &[full, full],
            PlaneRule::Planar420 => &[full, quarter],
            PlaneRule::BayerPlanar => &[quarter, quarter, quarter],
        };

        let mut layout = PlaneLayout {
            count: steps.len() as u32 + 1,
            ..Default::default()
        };
        let mut offset = 0u64;
        for (plane, step) in steps.iter().enumerate() {
            offset += step;
            layout.offsets[plane + 1] =
                u32::try_from(offset).map_err(|_| Error::Overflow {
                    what: "plane offset",
                    size: usize::try_from(offset).unwrap_or(usize::MAX),
                    limit: u32::MAX as usize,
                })?;
        }
        Ok(layout)
    }
}

impl TryFrom<u32> for FrameFormat {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ALL_FORMATS.get(value as usize).copied().ok_or(value)
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
