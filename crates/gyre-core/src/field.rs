//! Field keys, their self-description, and the [`FieldSet`] bitset.
//!
//! Every array the model stores is addressed by a [`FieldKey`]. Keys carry
//! static metadata (name, units, staggering, rank and storage kind) used by
//! the output registry, the pipeline validator and the boundary exchange.

use std::fmt;

/// Staggering tag of a field on the C-grid.
///
/// Used purely for self-description of outputs; solvers know where their
/// variables live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridPoint {
    /// Tracer point (cell centre).
    T,
    /// Eastern cell face.
    U,
    /// Northern cell face.
    V,
    /// Top cell face, horizontally at the tracer point.
    W,
    /// Eastern face at w levels.
    UW,
    /// Northern face at w levels.
    VW,
    /// Vorticity point (north-east corner).
    Zeta,
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::T => "T",
            Self::U => "U",
            Self::V => "V",
            Self::W => "W",
            Self::UW => "UW",
            Self::VW => "VW",
            Self::Zeta => "Zeta",
        };
        f.write_str(tag)
    }
}

/// Dimensionality of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rank {
    /// One value per horizontal column.
    Surface,
    /// One value per grid cell.
    Volume,
}

/// How a field is stored across time levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Three time slots; the stage owning the field writes `next`.
    Prognostic,
    /// Three time slots; written at `current` and read at `past` by the
    /// Adams-Bashforth blend.
    Tendency,
    /// Single slot, recomputed every step.
    Diagnostic,
}

/// Static description of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    /// Short variable name.
    pub name: &'static str,
    /// Physical units.
    pub units: &'static str,
    /// Human-readable description.
    pub long_name: &'static str,
    /// Staggering tag.
    pub grid: GridPoint,
    /// Surface or volume field.
    pub rank: Rank,
    /// Storage kind.
    pub kind: FieldKind,
}

/// Identifies one array of the model state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum FieldKey {
    // ── Prognostic ──
    /// Zonal velocity.
    U,
    /// Meridional velocity.
    V,
    /// Vertical velocity.
    W,
    /// Surface pressure of the barotropic mode.
    Psi,
    /// Conservative temperature.
    Temp,
    /// Salinity.
    Salt,
    /// In-situ density anomaly.
    Rho,
    /// Squared buoyancy frequency.
    Nsqr,
    /// Turbulent kinetic energy.
    Tke,
    /// Mesoscale eddy kinetic energy.
    Eke,
    /// Internal-wave energy.
    EIw,
    /// Vertically integrated M2 tidal wave energy.
    EM2,
    /// Vertically integrated near-inertial wave energy.
    ENiw,
    // ── Tendencies ──
    /// Explicit zonal momentum tendency.
    DU,
    /// Explicit meridional momentum tendency.
    DV,
    /// Explicit vertical momentum tendency (non-hydrostatic only).
    DW,
    /// Advective temperature tendency.
    DTemp,
    /// Advective salinity tendency.
    DSalt,
    /// Advective TKE tendency.
    DTke,
    /// Advective EKE tendency.
    DEke,
    /// Advective internal-wave energy tendency.
    DEIw,
    // ── Mixing coefficients ──
    /// Vertical viscosity.
    KappaM,
    /// Vertical diffusivity.
    KappaH,
    /// Eddy (GM) thickness diffusivity.
    KGm,
    /// Isoneutral diffusivity.
    KIso,
    /// Vertical component of the isoneutral diffusion tensor.
    K33,
    // ── Energy exchange terms ──
    /// Kinetic energy dissipated by vertical friction.
    KDissV,
    /// Kinetic energy dissipated by lateral friction.
    KDissH,
    /// Kinetic energy dissipated by bottom and Rayleigh drag.
    KDissBot,
    /// Potential energy change by vertical mixing.
    PDissV,
    /// Potential energy change by isoneutral mixing.
    PDissIso,
    /// Potential energy change by the skew flux.
    PDissSkew,
    /// Potential energy change by nonlinear equation of state.
    PDissNonlin,
    /// Potential energy change by compressibility.
    PDissComp,
    /// TKE dissipation.
    TkeDiss,
    /// EKE dissipation.
    EkeDiss,
    /// EKE dissipation handed to internal waves.
    EkeDissIw,
    /// EKE dissipation handed to TKE.
    EkeDissTke,
    /// EKE lost to lee-wave generation (surface flux).
    EkeLeeFlux,
    /// Internal-wave dissipation.
    IwDiss,
    // ── W-grid velocities ──
    /// Zonal velocity on w levels.
    UWgrid,
    /// Meridional velocity on w levels.
    VWgrid,
    /// Vertical velocity on the w-cell faces.
    WWgrid,
    // ── Surface forcing ──
    /// Kinematic zonal wind stress.
    SurfaceTaux,
    /// Kinematic meridional wind stress.
    SurfaceTauy,
    /// Surface temperature flux.
    TempFlux,
    /// Surface salinity flux.
    SaltFlux,
    /// Wind-driven TKE flux.
    TkeSurfaceFlux,
    /// Bottom internal-wave energy flux.
    IwBottomFlux,
    /// Surface internal-wave energy flux.
    IwSurfaceFlux,
    /// M2 tidal energy input.
    M2Forcing,
    /// Near-inertial energy input.
    NiwForcing,
}

impl FieldKey {
    /// Every key, in discriminant order.
    pub const ALL: [FieldKey; 52] = [
        Self::U,
        Self::V,
        Self::W,
        Self::Psi,
        Self::Temp,
        Self::Salt,
        Self::Rho,
        Self::Nsqr,
        Self::Tke,
        Self::Eke,
        Self::EIw,
        Self::EM2,
        Self::ENiw,
        Self::DU,
        Self::DV,
        Self::DW,
        Self::DTemp,
        Self::DSalt,
        Self::DTke,
        Self::DEke,
        Self::DEIw,
        Self::KappaM,
        Self::KappaH,
        Self::KGm,
        Self::KIso,
        Self::K33,
        Self::KDissV,
        Self::KDissH,
        Self::KDissBot,
        Self::PDissV,
        Self::PDissIso,
        Self::PDissSkew,
        Self::PDissNonlin,
        Self::PDissComp,
        Self::TkeDiss,
        Self::EkeDiss,
        Self::EkeDissIw,
        Self::EkeDissTke,
        Self::EkeLeeFlux,
        Self::IwDiss,
        Self::UWgrid,
        Self::VWgrid,
        Self::WWgrid,
        Self::SurfaceTaux,
        Self::SurfaceTauy,
        Self::TempFlux,
        Self::SaltFlux,
        Self::TkeSurfaceFlux,
        Self::IwBottomFlux,
        Self::IwSurfaceFlux,
        Self::M2Forcing,
        Self::NiwForcing,
    ];

    /// Bit index of this key in a [`FieldSet`].
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Look up a key by bit index.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .filter(|k| k.index() == index)
    }

    /// Static metadata for this key.
    pub fn meta(self) -> FieldMeta {
        use FieldKind::{Diagnostic as D, Prognostic as P, Tendency as Td};
        use GridPoint as G;
        use Rank::{Surface as S2, Volume as V3};
        let (name, units, long_name, grid, rank, kind) = match self {
            Self::U => ("u", "m/s", "zonal velocity", G::U, V3, P),
            Self::V => ("v", "m/s", "meridional velocity", G::V, V3, P),
            Self::W => ("w", "m/s", "vertical velocity", G::W, V3, P),
            Self::Psi => ("psi", "m^2/s^2", "surface pressure", G::T, S2, P),
            Self::Temp => ("temp", "deg C", "temperature", G::T, V3, P),
            Self::Salt => ("salt", "g/kg", "salinity", G::T, V3, P),
            Self::Rho => ("rho", "kg/m^3", "density anomaly", G::T, V3, P),
            Self::Nsqr => ("Nsqr", "1/s^2", "squared stability frequency", G::W, V3, P),
            Self::Tke => ("tke", "m^2/s^2", "turbulent kinetic energy", G::W, V3, P),
            Self::Eke => ("eke", "m^2/s^2", "eddy kinetic energy", G::W, V3, P),
            Self::EIw => ("E_iw", "m^2/s^2", "internal wave energy", G::W, V3, P),
            Self::EM2 => ("E_M2", "m^3/s^2", "M2 tidal wave energy", G::T, S2, P),
            Self::ENiw => ("E_niw", "m^3/s^2", "near-inertial wave energy", G::T, S2, P),
            Self::DU => ("du", "m/s^2", "zonal momentum tendency", G::U, V3, Td),
            Self::DV => ("dv", "m/s^2", "meridional momentum tendency", G::V, V3, Td),
            Self::DW => ("dw", "m/s^2", "vertical momentum tendency", G::W, V3, Td),
            Self::DTemp => ("dtemp", "deg C/s", "temperature tendency", G::T, V3, Td),
            Self::DSalt => ("dsalt", "g/kg/s", "salinity tendency", G::T, V3, Td),
            Self::DTke => ("dtke", "m^2/s^3", "TKE tendency", G::W, V3, Td),
            Self::DEke => ("deke", "m^2/s^3", "EKE tendency", G::W, V3, Td),
            Self::DEIw => ("dE_iw", "m^2/s^3", "internal wave energy tendency", G::W, V3, Td),
            Self::KappaM => ("kappaM", "m^2/s", "vertical viscosity", G::W, V3, D),
            Self::KappaH => ("kappaH", "m^2/s", "vertical diffusivity", G::W, V3, D),
            Self::KGm => ("K_gm", "m^2/s", "GM diffusivity", G::W, V3, D),
            Self::KIso => ("K_iso", "m^2/s", "isoneutral diffusivity", G::W, V3, D),
            Self::K33 => ("K_33", "m^2/s", "isoneutral tensor vertical component", G::W, V3, D),
            Self::KDissV => ("K_diss_v", "m^2/s^3", "dissipation by vertical friction", G::W, V3, D),
            Self::KDissH => ("K_diss_h", "m^2/s^3", "dissipation by lateral friction", G::T, V3, D),
            Self::KDissBot => ("K_diss_bot", "m^2/s^3", "dissipation by bottom friction", G::T, V3, D),
            Self::PDissV => ("P_diss_v", "m^2/s^3", "potential energy change by vertical mixing", G::W, V3, D),
            Self::PDissIso => ("P_diss_iso", "m^2/s^3", "potential energy change by isoneutral mixing", G::T, V3, D),
            Self::PDissSkew => ("P_diss_skew", "m^2/s^3", "potential energy change by skew flux", G::T, V3, D),
            Self::PDissNonlin => ("P_diss_nonlin", "m^2/s^3", "potential energy change by cabbeling", G::T, V3, D),
            Self::PDissComp => ("P_diss_comp", "m^2/s^3", "potential energy change by compressibility", G::T, V3, D),
            Self::TkeDiss => ("tke_diss", "m^2/s^3", "TKE dissipation", G::W, V3, D),
            Self::EkeDiss => ("eke_diss", "m^2/s^3", "EKE dissipation", G::W, V3, D),
            Self::EkeDissIw => ("eke_diss_iw", "m^2/s^3", "EKE dissipation into internal waves", G::W, V3, D),
            Self::EkeDissTke => ("eke_diss_tke", "m^2/s^3", "EKE dissipation into TKE", G::W, V3, D),
            Self::EkeLeeFlux => ("eke_lee_flux", "m^3/s^3", "EKE lost to lee waves", G::T, S2, D),
            Self::IwDiss => ("iw_diss", "m^2/s^3", "internal wave dissipation", G::W, V3, D),
            Self::UWgrid => ("u_wgrid", "m/s", "zonal velocity on w levels", G::UW, V3, D),
            Self::VWgrid => ("v_wgrid", "m/s", "meridional velocity on w levels", G::VW, V3, D),
            Self::WWgrid => ("w_wgrid", "m/s", "vertical velocity on w cells", G::T, V3, D),
            Self::SurfaceTaux => ("surface_taux", "m^2/s^2", "zonal wind stress", G::U, S2, D),
            Self::SurfaceTauy => ("surface_tauy", "m^2/s^2", "meridional wind stress", G::V, S2, D),
            Self::TempFlux => ("forc_temp_surface", "K m/s", "surface temperature flux", G::T, S2, D),
            Self::SaltFlux => ("forc_salt_surface", "g/kg m/s", "surface salinity flux", G::T, S2, D),
            Self::TkeSurfaceFlux => ("forc_tke_surface", "m^3/s^3", "surface TKE flux", G::T, S2, D),
            Self::IwBottomFlux => ("forc_iw_bottom", "m^3/s^3", "bottom internal wave flux", G::T, S2, D),
            Self::IwSurfaceFlux => ("forc_iw_surface", "m^3/s^3", "surface internal wave flux", G::T, S2, D),
            Self::M2Forcing => ("forc_M2", "m^3/s^3", "M2 tidal energy input", G::T, S2, D),
            Self::NiwForcing => ("forc_niw", "m^3/s^3", "near-inertial energy input", G::T, S2, D),
        };
        FieldMeta {
            name,
            units,
            long_name,
            grid,
            rank,
            kind,
        }
    }

    /// Short variable name.
    pub fn name(self) -> &'static str {
        self.meta().name
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of field keys implemented as a bitset.
///
/// Stages declare the fields they read and write with it, enabling the
/// orchestrator to validate the pipeline and drive the boundary exchange.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    bits: Vec<u64>,
}

impl FieldSet {
    const BITS_PER_WORD: usize = 64;

    /// Create an empty field set.
    pub fn empty() -> Self {
        Self { bits: Vec::new() }
    }

    /// Insert a key into the set.
    pub fn insert(&mut self, key: FieldKey) {
        let word = key.index() as usize / Self::BITS_PER_WORD;
        let bit = key.index() as usize % Self::BITS_PER_WORD;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1u64 << bit;
    }

    /// Check whether the set contains a key.
    pub fn contains(&self, key: FieldKey) -> bool {
        let word = key.index() as usize / Self::BITS_PER_WORD;
        let bit = key.index() as usize % Self::BITS_PER_WORD;
        word < self.bits.len() && (self.bits[word] & (1u64 << bit)) != 0
    }

    /// Return the union of two sets (`self | other`).
    pub fn union(&self, other: &Self) -> Self {
        let max_len = self.bits.len().max(other.bits.len());
        let bits = (0..max_len)
            .map(|i| self.bits.get(i).copied().unwrap_or(0) | other.bits.get(i).copied().unwrap_or(0))
            .collect();
        Self { bits }
    }

    /// Return the intersection of two sets (`self & other`).
    pub fn intersection(&self, other: &Self) -> Self {
        let min_len = self.bits.len().min(other.bits.len());
        let mut bits: Vec<u64> = (0..min_len).map(|i| self.bits[i] & other.bits[i]).collect();
        while bits.last() == Some(&0) {
            bits.pop();
        }
        Self { bits }
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the keys in the set, in discriminant order.
    pub fn iter(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.bits.iter().enumerate().flat_map(|(w, &word)| {
            (0..Self::BITS_PER_WORD)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .filter_map(move |bit| FieldKey::from_index((w * Self::BITS_PER_WORD + bit) as u32))
        })
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        let max_len = self.bits.len().max(other.bits.len());
        (0..max_len).all(|i| {
            self.bits.get(i).copied().unwrap_or(0) == other.bits.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for FieldSet {}

impl FromIterator<FieldKey> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldKey>>(iter: I) -> Self {
        let mut set = Self::empty();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_field_set() -> impl Strategy<Value = FieldSet> {
        prop::collection::vec(0usize..FieldKey::ALL.len(), 0..24)
            .prop_map(|ids| ids.into_iter().map(|i| FieldKey::ALL[i]).collect::<FieldSet>())
    }

    #[test]
    fn all_matches_discriminants() {
        for (i, key) in FieldKey::ALL.iter().enumerate() {
            assert_eq!(key.index() as usize, i, "{key} out of order");
            assert_eq!(FieldKey::from_index(i as u32), Some(*key));
        }
        assert_eq!(FieldKey::from_index(500), None);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = FieldKey::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FieldKey::ALL.len());
    }

    #[test]
    fn tendencies_pair_with_prognostics() {
        assert_eq!(FieldKey::DTemp.meta().kind, FieldKind::Tendency);
        assert_eq!(FieldKey::Temp.meta().kind, FieldKind::Prognostic);
        assert_eq!(FieldKey::Psi.meta().rank, Rank::Surface);
        assert_eq!(FieldKey::U.meta().grid, GridPoint::U);
    }

    proptest! {
        #[test]
        fn union_commutative(a in arb_field_set(), b in arb_field_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn intersection_is_subset_of_union(a in arb_field_set(), b in arb_field_set()) {
            let inter = a.intersection(&b);
            let uni = a.union(&b);
            for key in inter.iter() {
                prop_assert!(a.contains(key) && b.contains(key));
                prop_assert!(uni.contains(key));
            }
        }

        #[test]
        fn len_matches_iter_count(a in arb_field_set()) {
            prop_assert_eq!(a.len(), a.iter().count());
        }

        #[test]
        fn insert_contains(i in 0usize..52) {
            let mut set = FieldSet::empty();
            set.insert(FieldKey::ALL[i]);
            prop_assert!(set.contains(FieldKey::ALL[i]));
            prop_assert_eq!(set.len(), 1);
        }
    }
}
