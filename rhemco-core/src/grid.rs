//! Grid geometry of a simulation domain.
//!
//! The grid is created with zero dimensions and unbound buffers. The host sets
//! the dimensions and binds the coordinate arrays once its own grid is known.

use crate::buffer::{Buffer2D, Buffer3D};
use crate::errors::{HcoError, HcoResult};

#[derive(Debug, Clone, Default)]
pub struct Grid {
    nx: usize,
    ny: usize,
    nz: usize,
    /// Longitude of cell centres (nx, ny)
    pub xmid: Buffer2D,
    /// Latitude of cell centres (nx, ny)
    pub ymid: Buffer2D,
    /// Longitude of cell edges (nx + 1, ny)
    pub xedge: Buffer2D,
    /// Latitude of cell edges (nx, ny + 1)
    pub yedge: Buffer2D,
    /// Sine of the latitude edges (nx, ny + 1)
    pub ysin: Buffer2D,
    /// Surface area of each cell in m^2 (nx, ny)
    pub area_m2: Buffer2D,
    /// Surface geopotential height in m (nx, ny)
    pub zsfc: Buffer2D,
    /// Surface pressure in Pa (nx, ny)
    pub psfc: Buffer2D,
    /// Planetary boundary layer height in m (nx, ny)
    pub pbl_height: Buffer2D,
    /// Box heights in m (nx, ny, nz)
    pub bxheight_m: Buffer3D,
    /// Pressure at level edges in Pa (nx, ny, nz + 1)
    pub pedge: Buffer3D,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Number of horizontal cells
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny
    }

    fn expected_shapes(nx: usize, ny: usize, nz: usize) -> [(&'static str, Vec<usize>); 11] {
        [
            ("xmid", vec![nx, ny]),
            ("ymid", vec![nx, ny]),
            ("xedge", vec![nx + 1, ny]),
            ("yedge", vec![nx, ny + 1]),
            ("ysin", vec![nx, ny + 1]),
            ("area_m2", vec![nx, ny]),
            ("zsfc", vec![nx, ny]),
            ("psfc", vec![nx, ny]),
            ("pbl_height", vec![nx, ny]),
            ("bxheight_m", vec![nx, ny, nz]),
            ("pedge", vec![nx, ny, nz + 1]),
        ]
    }

    fn shapes(&self) -> [Option<Vec<usize>>; 11] {
        [
            self.xmid.shape(),
            self.ymid.shape(),
            self.xedge.shape(),
            self.yedge.shape(),
            self.ysin.shape(),
            self.area_m2.shape(),
            self.zsfc.shape(),
            self.psfc.shape(),
            self.pbl_height.shape(),
            self.bxheight_m.shape(),
            self.pedge.shape(),
        ]
    }

    /// Set the grid dimensions.
    ///
    /// Buffers that are already bound must agree with the new dimensions.
    pub fn set_dimensions(&mut self, nx: usize, ny: usize, nz: usize) -> HcoResult<()> {
        let expected = Self::expected_shapes(nx, ny, nz);
        for ((name, want), got) in expected.iter().zip(self.shapes()) {
            if let Some(got) = got {
                if &got != want {
                    return Err(HcoError::configuration(format!(
                        "grid buffer {} has shape {:?}, expected {:?}",
                        name, got, want
                    )));
                }
            }
        }
        self.nx = nx;
        self.ny = ny;
        self.nz = nz;
        Ok(())
    }

    /// Number of bound buffers
    pub fn n_bound(&self) -> usize {
        self.shapes().iter().filter(|s| s.is_some()).count()
    }

    /// Release every buffer; the dimensions are kept.
    pub fn release_buffers(&mut self) {
        self.xmid.release();
        self.ymid.release();
        self.xedge.release();
        self.yedge.release();
        self.ysin.release();
        self.area_m2.release();
        self.zsfc.release();
        self.psfc.release();
        self.pbl_height.release();
        self.bxheight_m.release();
        self.pedge.release();
    }
}
