//! The mutable model state passed explicitly through the pipeline.

use gyre_core::{FieldAccess, FieldKey, StepId};
use gyre_grid::{Grid, Shape};

use crate::ledger::TransferLedger;
use crate::levels::TimeLevels;
use crate::prognostic::Prognostic;

/// Which optional components to allocate.
///
/// Built once from the model configuration; a `false` flag means the
/// component owns no memory for the whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Turbulent kinetic energy closure.
    pub tke: bool,
    /// Mesoscale eddy kinetic energy closure.
    pub eke: bool,
    /// Internal-wave energy closure.
    pub idemix: bool,
    /// M2 and near-inertial wave-energy bands.
    pub wave_bands: bool,
    /// Isoneutral mixing tensor.
    pub isoneutral: bool,
    /// Velocities on the W grid.
    pub wgrid: bool,
    /// Prognostic vertical velocity tendency.
    pub non_hydrostatic: bool,
}

/// Vertical and eddy mixing coefficients, all on the W grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Mixing {
    /// Vertical viscosity.
    pub kappa_m: Vec<f64>,
    /// Vertical diffusivity.
    pub kappa_h: Vec<f64>,
    /// GM thickness diffusivity.
    pub k_gm: Vec<f64>,
    /// Isoneutral diffusivity.
    pub k_iso: Vec<f64>,
}

/// Energy exchange terms written by the dynamics.
#[derive(Clone, Debug, PartialEq)]
pub struct Dissipation {
    /// Vertical friction, W grid.
    pub k_diss_v: Vec<f64>,
    /// Lateral friction, T grid.
    pub k_diss_h: Vec<f64>,
    /// Bottom and Rayleigh drag, T grid.
    pub k_diss_bot: Vec<f64>,
    /// Vertical mixing of density, W grid.
    pub p_diss_v: Vec<f64>,
    /// Isoneutral mixing of density, T grid.
    pub p_diss_iso: Vec<f64>,
    /// Skew (GM) flux, T grid.
    pub p_diss_skew: Vec<f64>,
    /// Cabbeling residual of the nonlinear equation of state, T grid.
    pub p_diss_nonlin: Vec<f64>,
    /// Compressibility contribution, T grid.
    pub p_diss_comp: Vec<f64>,
}

/// Surface fluxes for the current step, one value per column.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceFields {
    /// Kinematic zonal wind stress at u points.
    pub taux: Vec<f64>,
    /// Kinematic meridional wind stress at v points.
    pub tauy: Vec<f64>,
    /// Temperature flux.
    pub temp_flux: Vec<f64>,
    /// Salinity flux.
    pub salt_flux: Vec<f64>,
    /// Wind-driven TKE input.
    pub tke_flux: Vec<f64>,
    /// Internal-wave energy flux at the bottom.
    pub iw_bottom: Vec<f64>,
    /// Internal-wave energy flux at the surface.
    pub iw_surface: Vec<f64>,
    /// M2 band energy input.
    pub m2: Vec<f64>,
    /// Near-inertial band energy input.
    pub niw: Vec<f64>,
}

/// Tapered isoneutral slopes and the vertical tensor component, W grid.
#[derive(Clone, Debug, PartialEq)]
pub struct IsoneutralTensor {
    /// Zonal slope.
    pub slope_x: Vec<f64>,
    /// Meridional slope.
    pub slope_y: Vec<f64>,
    /// `K_iso * |s|^2`.
    pub k33: Vec<f64>,
}

/// Velocities interpolated onto W cells for closure advection.
#[derive(Clone, Debug, PartialEq)]
pub struct WGridVelocity {
    /// Zonal velocity at u columns on W levels.
    pub u: Vec<f64>,
    /// Meridional velocity at v columns on W levels.
    pub v: Vec<f64>,
    /// Vertical velocity on the top face of each W cell.
    pub w: Vec<f64>,
}

/// TKE closure fields.
#[derive(Clone, Debug, PartialEq)]
pub struct TkeFields {
    /// Turbulent kinetic energy.
    pub tke: Prognostic,
    /// Advective tendency.
    pub dtke: Prognostic,
    /// Dissipation rate of the last step.
    pub diss: Vec<f64>,
    /// Mixing length.
    pub mxl: Vec<f64>,
}

/// EKE closure fields.
#[derive(Clone, Debug, PartialEq)]
pub struct EkeFields {
    /// Eddy kinetic energy.
    pub eke: Prognostic,
    /// Advective tendency.
    pub deke: Prognostic,
    /// Total dissipation.
    pub diss: Vec<f64>,
    /// Part of `diss` handed to internal waves.
    pub diss_iw: Vec<f64>,
    /// Part of `diss` handed to TKE.
    pub diss_tke: Vec<f64>,
    /// Column energy loss to lee waves.
    pub lee_flux: Vec<f64>,
    /// Eddy length scale.
    pub length: Vec<f64>,
}

/// IDEMIX fields.
#[derive(Clone, Debug, PartialEq)]
pub struct IdemixFields {
    /// Internal-wave energy.
    pub e_iw: Prognostic,
    /// Advective tendency.
    pub de_iw: Prognostic,
    /// Dissipation `alpha_c * E^2`.
    pub diss: Vec<f64>,
    /// Vertical group speed.
    pub c0: Vec<f64>,
    /// Horizontal group speed.
    pub v0: Vec<f64>,
    /// Dissipation coefficient.
    pub alpha_c: Vec<f64>,
}

/// Vertically integrated wave-energy bands.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveBandFields {
    /// M2 tidal band.
    pub e_m2: Prognostic,
    /// Near-inertial band.
    pub e_niw: Prognostic,
}

/// Every mutable array of the model.
///
/// Prognostic fields keep three time slots selected by [`levels`](Self::levels).
/// Diagnostic arrays are single-slot and overwritten by their owning stage
/// each step.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelState {
    shape: Shape,
    /// Current time-slot assignment.
    pub levels: TimeLevels,
    /// Number of completed steps.
    pub step: StepId,
    /// Model time of the `current` slot, seconds.
    pub time: f64,

    /// Zonal velocity.
    pub u: Prognostic,
    /// Meridional velocity.
    pub v: Prognostic,
    /// Vertical velocity.
    pub w: Prognostic,
    /// Surface pressure (per column).
    pub psi: Prognostic,
    /// Temperature.
    pub temp: Prognostic,
    /// Salinity.
    pub salt: Prognostic,
    /// Density anomaly.
    pub rho: Prognostic,
    /// Squared buoyancy frequency.
    pub nsqr: Prognostic,

    /// Zonal momentum tendency.
    pub du: Prognostic,
    /// Meridional momentum tendency.
    pub dv: Prognostic,
    /// Vertical momentum tendency, non-hydrostatic runs only.
    pub dw: Option<Prognostic>,
    /// Temperature tendency.
    pub dtemp: Prognostic,
    /// Salinity tendency.
    pub dsalt: Prognostic,

    /// Mixing coefficients.
    pub mixing: Mixing,
    /// Energy exchange terms.
    pub dissipation: Dissipation,
    /// Surface forcing of this step.
    pub surface: SurfaceFields,

    /// Isoneutral tensor.
    pub isoneutral: Option<IsoneutralTensor>,
    /// W-grid velocities.
    pub wgrid: Option<WGridVelocity>,
    /// TKE closure.
    pub tke: Option<TkeFields>,
    /// EKE closure.
    pub eke: Option<EkeFields>,
    /// IDEMIX closure.
    pub idemix: Option<IdemixFields>,
    /// IDEMIX wave bands.
    pub wave_bands: Option<WaveBandFields>,

    /// Inter-closure energy transfers of the step in progress.
    pub transfers: TransferLedger,
    /// Iterations used by the last barotropic solve.
    pub barotropic_iterations: usize,
    /// Iterations used by the last non-hydrostatic pressure solve.
    pub pressure_iterations: usize,
}

fn volume(n: usize) -> Vec<f64> {
    vec![0.0; n]
}

impl ModelState {
    /// Allocate a zero state for `grid` with the components in `alloc`.
    pub fn new(grid: &Grid, alloc: Allocation) -> Self {
        let shape = *grid.shape();
        let n = shape.cells();
        let cols = shape.columns();
        let p3 = || Prognostic::zeros(n);

        Self {
            shape,
            levels: TimeLevels::default(),
            step: StepId::default(),
            time: 0.0,
            u: p3(),
            v: p3(),
            w: p3(),
            psi: Prognostic::zeros(cols),
            temp: p3(),
            salt: p3(),
            rho: p3(),
            nsqr: p3(),
            du: p3(),
            dv: p3(),
            dw: alloc.non_hydrostatic.then(p3),
            dtemp: p3(),
            dsalt: p3(),
            mixing: Mixing {
                kappa_m: volume(n),
                kappa_h: volume(n),
                k_gm: volume(n),
                k_iso: volume(n),
            },
            dissipation: Dissipation {
                k_diss_v: volume(n),
                k_diss_h: volume(n),
                k_diss_bot: volume(n),
                p_diss_v: volume(n),
                p_diss_iso: volume(n),
                p_diss_skew: volume(n),
                p_diss_nonlin: volume(n),
                p_diss_comp: volume(n),
            },
            surface: SurfaceFields {
                taux: volume(cols),
                tauy: volume(cols),
                temp_flux: volume(cols),
                salt_flux: volume(cols),
                tke_flux: volume(cols),
                iw_bottom: volume(cols),
                iw_surface: volume(cols),
                m2: volume(cols),
                niw: volume(cols),
            },
            isoneutral: alloc.isoneutral.then(|| IsoneutralTensor {
                slope_x: volume(n),
                slope_y: volume(n),
                k33: volume(n),
            }),
            wgrid: alloc.wgrid.then(|| WGridVelocity {
                u: volume(n),
                v: volume(n),
                w: volume(n),
            }),
            tke: alloc.tke.then(|| TkeFields {
                tke: p3(),
                dtke: p3(),
                diss: volume(n),
                mxl: volume(n),
            }),
            eke: alloc.eke.then(|| EkeFields {
                eke: p3(),
                deke: p3(),
                diss: volume(n),
                diss_iw: volume(n),
                diss_tke: volume(n),
                lee_flux: volume(cols),
                length: volume(n),
            }),
            idemix: alloc.idemix.then(|| IdemixFields {
                e_iw: p3(),
                de_iw: p3(),
                diss: volume(n),
                c0: volume(n),
                v0: volume(n),
                alpha_c: volume(n),
            }),
            wave_bands: alloc.wave_bands.then(|| WaveBandFields {
                e_m2: Prognostic::zeros(cols),
                e_niw: Prognostic::zeros(cols),
            }),
            transfers: TransferLedger::new(),
            barotropic_iterations: 0,
            pressure_iterations: 0,
        }
    }

    /// Array shape the state was allocated for.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The three-level storage behind a prognostic or tendency key.
    pub fn prognostic(&self, key: FieldKey) -> Option<&Prognostic> {
        use FieldKey as K;
        match key {
            K::U => Some(&self.u),
            K::V => Some(&self.v),
            K::W => Some(&self.w),
            K::Psi => Some(&self.psi),
            K::Temp => Some(&self.temp),
            K::Salt => Some(&self.salt),
            K::Rho => Some(&self.rho),
            K::Nsqr => Some(&self.nsqr),
            K::Tke => self.tke.as_ref().map(|t| &t.tke),
            K::Eke => self.eke.as_ref().map(|e| &e.eke),
            K::EIw => self.idemix.as_ref().map(|i| &i.e_iw),
            K::EM2 => self.wave_bands.as_ref().map(|b| &b.e_m2),
            K::ENiw => self.wave_bands.as_ref().map(|b| &b.e_niw),
            K::DU => Some(&self.du),
            K::DV => Some(&self.dv),
            K::DW => self.dw.as_ref(),
            K::DTemp => Some(&self.dtemp),
            K::DSalt => Some(&self.dsalt),
            K::DTke => self.tke.as_ref().map(|t| &t.dtke),
            K::DEke => self.eke.as_ref().map(|e| &e.deke),
            K::DEIw => self.idemix.as_ref().map(|i| &i.de_iw),
            _ => None,
        }
    }

    /// Mutable three-level storage, e.g. to set initial conditions.
    pub fn prognostic_mut(&mut self, key: FieldKey) -> Option<&mut Prognostic> {
        use FieldKey as K;
        match key {
            K::U => Some(&mut self.u),
            K::V => Some(&mut self.v),
            K::W => Some(&mut self.w),
            K::Psi => Some(&mut self.psi),
            K::Temp => Some(&mut self.temp),
            K::Salt => Some(&mut self.salt),
            K::Rho => Some(&mut self.rho),
            K::Nsqr => Some(&mut self.nsqr),
            K::Tke => self.tke.as_mut().map(|t| &mut t.tke),
            K::Eke => self.eke.as_mut().map(|e| &mut e.eke),
            K::EIw => self.idemix.as_mut().map(|i| &mut i.e_iw),
            K::EM2 => self.wave_bands.as_mut().map(|b| &mut b.e_m2),
            K::ENiw => self.wave_bands.as_mut().map(|b| &mut b.e_niw),
            K::DU => Some(&mut self.du),
            K::DV => Some(&mut self.dv),
            K::DW => self.dw.as_mut(),
            K::DTemp => Some(&mut self.dtemp),
            K::DSalt => Some(&mut self.dsalt),
            K::DTke => self.tke.as_mut().map(|t| &mut t.dtke),
            K::DEke => self.eke.as_mut().map(|e| &mut e.deke),
            K::DEIw => self.idemix.as_mut().map(|i| &mut i.de_iw),
            _ => None,
        }
    }

    /// A single-slot diagnostic array.
    pub fn diagnostic(&self, key: FieldKey) -> Option<&[f64]> {
        use FieldKey as K;
        let d = &self.dissipation;
        let s = &self.surface;
        let v: &Vec<f64> = match key {
            K::KappaM => &self.mixing.kappa_m,
            K::KappaH => &self.mixing.kappa_h,
            K::KGm => &self.mixing.k_gm,
            K::KIso => &self.mixing.k_iso,
            K::K33 => &self.isoneutral.as_ref()?.k33,
            K::KDissV => &d.k_diss_v,
            K::KDissH => &d.k_diss_h,
            K::KDissBot => &d.k_diss_bot,
            K::PDissV => &d.p_diss_v,
            K::PDissIso => &d.p_diss_iso,
            K::PDissSkew => &d.p_diss_skew,
            K::PDissNonlin => &d.p_diss_nonlin,
            K::PDissComp => &d.p_diss_comp,
            K::TkeDiss => &self.tke.as_ref()?.diss,
            K::EkeDiss => &self.eke.as_ref()?.diss,
            K::EkeDissIw => &self.eke.as_ref()?.diss_iw,
            K::EkeDissTke => &self.eke.as_ref()?.diss_tke,
            K::EkeLeeFlux => &self.eke.as_ref()?.lee_flux,
            K::IwDiss => &self.idemix.as_ref()?.diss,
            K::UWgrid => &self.wgrid.as_ref()?.u,
            K::VWgrid => &self.wgrid.as_ref()?.v,
            K::WWgrid => &self.wgrid.as_ref()?.w,
            K::SurfaceTaux => &s.taux,
            K::SurfaceTauy => &s.tauy,
            K::TempFlux => &s.temp_flux,
            K::SaltFlux => &s.salt_flux,
            K::TkeSurfaceFlux => &s.tke_flux,
            K::IwBottomFlux => &s.iw_bottom,
            K::IwSurfaceFlux => &s.iw_surface,
            K::M2Forcing => &s.m2,
            K::NiwForcing => &s.niw,
            _ => return None,
        };
        Some(v)
    }

    /// Mutable single-slot diagnostic array.
    pub fn diagnostic_mut(&mut self, key: FieldKey) -> Option<&mut [f64]> {
        use FieldKey as K;
        let d = &mut self.dissipation;
        let s = &mut self.surface;
        let v: &mut Vec<f64> = match key {
            K::KappaM => &mut self.mixing.kappa_m,
            K::KappaH => &mut self.mixing.kappa_h,
            K::KGm => &mut self.mixing.k_gm,
            K::KIso => &mut self.mixing.k_iso,
            K::K33 => &mut self.isoneutral.as_mut()?.k33,
            K::KDissV => &mut d.k_diss_v,
            K::KDissH => &mut d.k_diss_h,
            K::KDissBot => &mut d.k_diss_bot,
            K::PDissV => &mut d.p_diss_v,
            K::PDissIso => &mut d.p_diss_iso,
            K::PDissSkew => &mut d.p_diss_skew,
            K::PDissNonlin => &mut d.p_diss_nonlin,
            K::PDissComp => &mut d.p_diss_comp,
            K::TkeDiss => &mut self.tke.as_mut()?.diss,
            K::EkeDiss => &mut self.eke.as_mut()?.diss,
            K::EkeDissIw => &mut self.eke.as_mut()?.diss_iw,
            K::EkeDissTke => &mut self.eke.as_mut()?.diss_tke,
            K::EkeLeeFlux => &mut self.eke.as_mut()?.lee_flux,
            K::IwDiss => &mut self.idemix.as_mut()?.diss,
            K::UWgrid => &mut self.wgrid.as_mut()?.u,
            K::VWgrid => &mut self.wgrid.as_mut()?.v,
            K::WWgrid => &mut self.wgrid.as_mut()?.w,
            K::SurfaceTaux => &mut s.taux,
            K::SurfaceTauy => &mut s.tauy,
            K::TempFlux => &mut s.temp_flux,
            K::SaltFlux => &mut s.salt_flux,
            K::TkeSurfaceFlux => &mut s.tke_flux,
            K::IwBottomFlux => &mut s.iw_bottom,
            K::IwSurfaceFlux => &mut s.iw_surface,
            K::M2Forcing => &mut s.m2,
            K::NiwForcing => &mut s.niw,
            _ => return None,
        };
        Some(v)
    }

    /// The array a stage writes for `key` during a step: the `next` slot of
    /// a prognostic field, the `current` slot of a tendency, or the
    /// diagnostic array itself.
    pub fn written(&self, key: FieldKey) -> Option<&[f64]> {
        let lv = self.levels;
        match key.meta().kind {
            gyre_core::FieldKind::Prognostic => self.prognostic(key).map(|p| p.next(lv)),
            gyre_core::FieldKind::Tendency => self.prognostic(key).map(|p| p.current(lv)),
            gyre_core::FieldKind::Diagnostic => self.diagnostic(key),
        }
    }

    /// Mutable form of [`written`](Self::written).
    pub fn written_mut(&mut self, key: FieldKey) -> Option<&mut [f64]> {
        let lv = self.levels;
        match key.meta().kind {
            gyre_core::FieldKind::Prognostic => self.prognostic_mut(key).map(|p| p.next_mut(lv)),
            gyre_core::FieldKind::Tendency => self
                .prognostic_mut(key)
                .map(|p| p.slot_mut(lv.current())),
            gyre_core::FieldKind::Diagnostic => self.diagnostic_mut(key),
        }
    }

    /// Whether `key` is allocated in this state.
    pub fn has(&self, key: FieldKey) -> bool {
        self.prognostic(key).is_some() || self.diagnostic(key).is_some()
    }

    /// Promote `next` to `current` and advance the clock.
    ///
    /// Only called after every stage of a step succeeded.
    pub fn rotate(&mut self, dt: f64) {
        self.levels.rotate();
        self.step = self.step.next();
        self.time += dt;
    }
}

impl FieldAccess for ModelState {
    fn field(&self, key: FieldKey) -> Option<&[f64]> {
        match key.meta().kind {
            gyre_core::FieldKind::Diagnostic => self.diagnostic(key),
            _ => self.prognostic(key).map(|p| p.current(self.levels)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::GridBuilder;

    fn grid() -> Grid {
        GridBuilder::new(3, 2, 2).build().unwrap()
    }

    #[test]
    fn disabled_closures_own_nothing() {
        let state = ModelState::new(&grid(), Allocation::default());
        assert!(state.tke.is_none());
        assert!(state.field(FieldKey::Tke).is_none());
        assert!(state.field(FieldKey::TkeDiss).is_none());
        assert!(!state.has(FieldKey::DW));
        assert!(state.has(FieldKey::KappaM));
    }

    #[test]
    fn every_allocated_key_has_the_right_length() {
        let g = grid();
        let alloc = Allocation {
            tke: true,
            eke: true,
            idemix: true,
            wave_bands: true,
            isoneutral: true,
            wgrid: true,
            non_hydrostatic: true,
        };
        let state = ModelState::new(&g, alloc);
        for key in FieldKey::ALL {
            let data = state.field(key).unwrap_or_else(|| panic!("{key} missing"));
            let expected = match key.meta().rank {
                gyre_core::Rank::Surface => g.shape().columns(),
                gyre_core::Rank::Volume => g.shape().cells(),
            };
            assert_eq!(data.len(), expected, "{key}");
        }
    }

    #[test]
    fn rotation_promotes_next_and_keeps_previous_as_past() {
        let mut state = ModelState::new(&grid(), Allocation::default());
        state.written_mut(FieldKey::Temp).unwrap().fill(1.0);
        state.rotate(10.0);
        assert_eq!(state.field(FieldKey::Temp).unwrap()[0], 1.0);
        state.written_mut(FieldKey::Temp).unwrap().fill(2.0);
        state.rotate(10.0);
        assert_eq!(state.field(FieldKey::Temp).unwrap()[0], 2.0);
        assert_eq!(state.temp.past(state.levels)[0], 1.0);
        assert_eq!(state.step, StepId(2));
        assert_eq!(state.time, 20.0);
    }

    #[test]
    fn tendencies_are_written_at_current() {
        let mut state = ModelState::new(&grid(), Allocation::default());
        state.written_mut(FieldKey::DTemp).unwrap().fill(3.0);
        let lv = state.levels;
        assert_eq!(state.dtemp.current(lv)[0], 3.0);
        assert_eq!(state.dtemp.next(lv)[0], 0.0);
    }
}
