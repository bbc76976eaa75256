//! Integration tests: discrete conservation over many steps.

use gyre_core::{FieldKey, NoForcing, SteadyForcing, SurfaceForcing};
use gyre_engine::{EnergyBudget, Model, ModelConfig};
use gyre_grid::Grid;
use gyre_state::{ModelState, TransferRoute};
use gyre_test_utils::{
    channel, closed_basin, stepped_basin, stratified_state, uniform_tracers, uniform_wind,
};

fn heat_content(grid: &Grid, state: &ModelState) -> f64 {
    let lv = state.levels;
    let t = state.temp.current(lv);
    grid.integrate_t(|c| t[c])
}

#[test]
fn uniform_tracer_at_rest_stays_uniform() {
    let grid = closed_basin(10, 10, 5);
    let cfg = ModelConfig {
        dt: 3600.0,
        ..ModelConfig::default()
    };
    let mut state = ModelState::new(&grid, cfg.allocation());
    uniform_tracers(&mut state, &grid, 1.0, 1.0);
    let mut model = Model::with_state(grid, cfg, state).unwrap();

    model.run(&NoForcing, 50).unwrap();

    let grid = model.grid();
    let state = model.state();
    let lv = state.levels;
    for (t, m) in state.temp.current(lv).iter().zip(&grid.mask_t) {
        if *m > 0.0 {
            assert!((t - 1.0).abs() < 1e-10, "temperature drifted to {t}");
        }
    }
    for (s, m) in state.salt.current(lv).iter().zip(&grid.mask_t) {
        if *m > 0.0 {
            assert!((s - 1.0).abs() < 1e-10, "salinity drifted to {s}");
        }
    }
    assert!(state.u.current(lv).iter().all(|&u| u == 0.0));
}

#[test]
fn wind_driven_flow_conserves_heat_content() {
    let grid = channel(8, 6, 4);
    let cfg = ModelConfig {
        dt: 600.0,
        ..ModelConfig::default()
    };
    let state = stratified_state(&grid, cfg.allocation(), 20.0, 4.0);
    let before = heat_content(&grid, &state);
    let columns = grid.shape().columns();
    let mut model = Model::with_state(grid, cfg, state).unwrap();
    let wind = SteadyForcing::new(uniform_wind(columns, 1e-4));

    model.run(&wind, 20).unwrap();

    let lv = model.state().levels;
    assert!(model.state().u.current(lv).iter().any(|&u| u != 0.0));
    let after = heat_content(model.grid(), model.state());
    assert!(
        (after - before).abs() < 1e-10 * before.abs(),
        "heat content {before} -> {after}"
    );
}

#[test]
fn masks_hold_after_every_step() {
    let grid = stepped_basin(6, 5, 4);
    let cfg = ModelConfig {
        dt: 600.0,
        ..ModelConfig::default()
    };
    let state = stratified_state(&grid, cfg.allocation(), 15.0, 5.0);
    let columns = grid.shape().columns();
    let mut model = Model::with_state(grid, cfg, state).unwrap();
    let wind = SteadyForcing::new(uniform_wind(columns, 5e-5));

    for _ in 0..5 {
        model.advance_one_step(&wind).unwrap();
        let grid = model.grid();
        assert_eq!(grid.check_mask_consistency(), Ok(()));
        let state = model.state();
        let lv = state.levels;
        for (field, mask) in [
            (state.temp.current(lv), &grid.mask_t),
            (state.salt.current(lv), &grid.mask_t),
            (state.u.current(lv), &grid.mask_u),
            (state.v.current(lv), &grid.mask_v),
        ] {
            for (x, m) in field.iter().zip(mask) {
                if *m == 0.0 {
                    assert_eq!(*x, 0.0);
                }
            }
        }
    }
}

/// Largest relative change of the total energy between two steps of an
/// unforced run. Only turbulent dissipation leaves the budget.
const ENERGY_DRIFT: f64 = 1e-5;

/// Closed, unforced basin with every closure running: each step the
/// energy a closure hands over must equal what the receiver injects, and
/// kinetic, potential and closure energy together stay nearly constant.
#[test]
fn closure_transfers_balance_over_100_steps() {
    let grid = closed_basin(6, 6, 4);
    let mut cfg = ModelConfig {
        dt: 600.0,
        enable_conserve_energy: true,
        conserve_tolerance: 1e-8,
        diagnostics_interval: 25,
        ..ModelConfig::default()
    };
    cfg.momentum.implicit_vert_friction = true;
    cfg.momentum.a_h = 1e3;
    cfg.momentum.r_bot = 1e-5;
    cfg.tke.enabled = true;
    cfg.eke.enabled = true;
    cfg.idemix.enabled = true;

    let mut state = stratified_state(&grid, cfg.allocation(), 20.0, 4.0);
    let s = *grid.shape();
    let lv = state.levels;
    for slot in [lv.past(), lv.current()] {
        let u = state.u.slot_mut(slot);
        for c in 0..s.cells() {
            let k = (c % s.nz) as f64;
            u[c] = 0.02 * (1.0 + k) * grid.mask_u[c];
        }
        let tke = state.tke.as_mut().unwrap().tke.slot_mut(slot);
        for (e, m) in tke.iter_mut().zip(&grid.mask_w) {
            *e = 1e-6 * m;
        }
        let eke = state.eke.as_mut().unwrap().eke.slot_mut(slot);
        for (e, m) in eke.iter_mut().zip(&grid.mask_w) {
            *e = 1e-4 * m;
        }
        let e_iw = state.idemix.as_mut().unwrap().e_iw.slot_mut(slot);
        for (e, m) in e_iw.iter_mut().zip(&grid.mask_w) {
            *e = 1e-6 * m;
        }
    }

    let mut model = Model::with_state(grid, cfg, state).unwrap();
    let mut budgets = Vec::new();
    let mut previous: Option<EnergyBudget> = None;
    for _ in 0..100 {
        let report = model.advance_one_step(&NoForcing).unwrap();
        let now = EnergyBudget::compute(model.grid(), model.state());
        if let Some(prev) = previous {
            let drift = (now.total() - prev.total()).abs() / prev.total().abs();
            assert!(
                drift < ENERGY_DRIFT,
                "step {}: total energy {:e} -> {:e}",
                report.step,
                prev.total(),
                now.total()
            );
        }
        previous = Some(now);
        assert!(
            report.warnings.is_empty(),
            "step {}: {:?}",
            report.step,
            report.warnings
        );
        for route in [
            TransferRoute::ShearToTke,
            TransferRoute::LateralFrictionToEke,
            TransferRoute::EkeToIdemix,
            TransferRoute::IdemixToTke,
            TransferRoute::BottomFrictionToIdemix,
        ] {
            assert!(
                report.transfers.get(route).is_some(),
                "route {route} missing at step {}",
                report.step
            );
        }
        if let Some(e) = report.energy {
            budgets.push(e);
        }
    }

    assert_eq!(budgets.len(), 4);
    for e in &budgets {
        assert!(e.total().is_finite());
        assert!(e.tke.is_finite() && e.eke.is_finite() && e.internal_waves.is_finite());
    }
    let end = EnergyBudget::compute(model.grid(), model.state());
    assert_eq!(end, *budgets.last().unwrap());

    // Closure energies and exchange terms stayed allocated and written.
    let state = model.state();
    assert!(state.diagnostic(FieldKey::EkeDissIw).is_some());
    assert!(state.diagnostic(FieldKey::IwDiss).is_some());
}

#[test]
fn initial_density_follows_the_tracers() {
    let grid = closed_basin(4, 4, 3);
    let cfg = ModelConfig::default();
    let eos = cfg.tracer.eos;
    let state = stratified_state(&grid, cfg.allocation(), 18.0, 4.0);
    let model = Model::with_state(grid, cfg, state).unwrap();
    let (grid, state) = (model.grid(), model.state());
    let lv = state.levels;
    let nz = grid.shape().nz;
    for slot in [lv.past(), lv.current()] {
        let (t, s, rho) = (state.temp.slot(slot), state.salt.slot(slot), state.rho.slot(slot));
        for c in 0..grid.shape().cells() {
            let expected = eos.density(t[c], s[c], -grid.zt[c % nz]) * grid.mask_t[c];
            assert_eq!(rho[c], expected);
        }
        // Warm over cold: stable everywhere below the surface level.
        let col = grid.col(2, 2) * nz;
        assert!(state.nsqr.slot(slot)[col] > 0.0);
    }
    let e = EnergyBudget::compute(grid, state);
    assert!(e.potential != 0.0);
}

#[test]
fn forced_closures_keep_the_ledger_balanced() {
    let grid = channel(6, 4, 4);
    let mut cfg = ModelConfig {
        dt: 900.0,
        enable_conserve_energy: true,
        conserve_tolerance: 1e-8,
        ..ModelConfig::default()
    };
    cfg.momentum.implicit_vert_friction = true;
    cfg.momentum.r_bot = 1e-5;
    cfg.tke.enabled = true;
    cfg.tke.store_bottom_friction = true;
    cfg.idemix.enabled = true;

    let state = stratified_state(&grid, cfg.allocation(), 12.0, 2.0);
    let columns = grid.shape().columns();
    let mut model = Model::with_state(grid, cfg, state).unwrap();
    let forcing = SteadyForcing::new(SurfaceForcing {
        iw_bottom: vec![1e-6; columns],
        iw_surface: vec![1e-7; columns],
        ..uniform_wind(columns, 1e-4)
    });

    for _ in 0..30 {
        let report = model.advance_one_step(&forcing).unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(report.transfers.get(TransferRoute::BottomFrictionToTke).is_some());
        assert!(report.transfers.get(TransferRoute::BottomFrictionToIdemix).is_none());
    }
    let lv = model.state().levels;
    let e_iw = &model.state().idemix.as_ref().unwrap().e_iw;
    assert!(e_iw.current(lv).iter().any(|&e| e > 0.0));
}
