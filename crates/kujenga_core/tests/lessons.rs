use kujenga_core::equilibrium::{solve_equilibrium, NewtonSettings, Stability};
use kujenga_core::models::{PredatorPrey, Sir};
use kujenga_core::phase_plane::{analyze, AxisSpec, Nullcline, PlaneSlice};
use kujenga_core::util::linspace;
use kujenga_core::{simulate, Error, IntegratorSettings, InvalidInput, Trajectory};

fn rabbits_and_foxes() -> PredatorPrey {
    PredatorPrey::new(5.0, 1.0, 0.15, 1.0).expect("valid rates")
}

fn epidemic() -> Sir {
    Sir::new(0.5, 1.0 / 7.0).expect("valid rates")
}

fn run_rabbits_and_foxes() -> Trajectory {
    simulate(
        &rabbits_and_foxes(),
        &[10.0, 2.0],
        &linspace(0.0, 20.0, 1000),
        &IntegratorSettings::default(),
    )
    .expect("simulation should succeed")
}

fn run_epidemic() -> Trajectory {
    simulate(
        &epidemic(),
        &[0.9999, 0.0001, 0.0],
        &linspace(0.0, 100.0, 1000),
        &IntegratorSettings::default(),
    )
    .expect("simulation should succeed")
}

#[test]
fn populations_stay_positive_and_circle_the_coexistence_point() {
    let model = rabbits_and_foxes();
    let trajectory = run_rabbits_and_foxes();
    assert_eq!(trajectory.len(), 1000);
    assert_eq!(trajectory.states()[0], vec![10.0, 2.0]);
    assert_eq!(trajectory.times()[999], 20.0);

    for (t, state) in trajectory.iter() {
        assert!(state[0] > 0.0 && state[1] > 0.0, "non-positive population at t = {t}");
    }

    let [rabbits_star, foxes_star] = model.coexistence().expect("positive rates");
    assert!(!trajectory.crossings(PredatorPrey::FOXES, foxes_star).is_empty());
    assert!(!trajectory.crossings(PredatorPrey::RABBITS, rabbits_star).is_empty());
}

#[test]
fn predator_prey_invariant_is_conserved() {
    let model = rabbits_and_foxes();
    let trajectory = run_rabbits_and_foxes();
    let start = model.conserved_quantity(10.0, 2.0);
    for (t, state) in trajectory.iter() {
        let value = model.conserved_quantity(state[0], state[1]);
        let drift = ((value - start) / start).abs();
        assert!(drift < 1e-4, "relative drift {drift} at t = {t}");
    }
}

#[test]
fn epidemic_population_is_conserved() {
    let trajectory = run_epidemic();
    for (t, state) in trajectory.iter() {
        let total: f64 = state.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "S + I + R = {total} at t = {t}");
    }
}

#[test]
fn infections_peak_once_when_susceptibles_reach_the_threshold() {
    let sir = epidemic();
    let trajectory = run_epidemic();
    let infected = trajectory.component(Sir::INFECTED).expect("component exists");
    let peak = trajectory.peak(Sir::INFECTED).expect("component exists");
    assert!(peak.index > 0 && peak.index < trajectory.len() - 1);

    for pair in infected[..=peak.index].windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    for pair in infected[peak.index..].windows(2) {
        assert!(pair[1] <= pair[0]);
    }

    let threshold = sir.threshold().expect("beta > 0");
    assert!((threshold - 2.0 / 7.0).abs() < 1e-12);
    let crossings = trajectory.crossings(Sir::SUSCEPTIBLE, threshold);
    assert_eq!(crossings.len(), 1);
    let spacing = trajectory.times()[1] - trajectory.times()[0];
    assert!(
        (crossings[0] - peak.time).abs() <= 2.0 * spacing,
        "peak at {} but S crosses the threshold at {}",
        peak.time,
        crossings[0]
    );
}

#[test]
fn repeated_runs_are_identical() {
    assert_eq!(run_epidemic(), run_epidemic());
    assert_eq!(run_rabbits_and_foxes(), run_rabbits_and_foxes());
}

#[test]
fn a_single_time_point_is_rejected() {
    let result = simulate(
        &epidemic(),
        &[0.9999, 0.0001, 0.0],
        &[0.0],
        &IntegratorSettings::default(),
    );
    assert!(matches!(
        result,
        Err(Error::InvalidInput(InvalidInput::TooFewTimePoints { count: 1 }))
    ));
}

#[test]
fn rabbit_and_fox_phase_portrait() {
    let model = rabbits_and_foxes();
    let slice = PlaneSlice::new(
        AxisSpec::new(PredatorPrey::RABBITS, 1.0, 30.0, 6),
        AxisSpec::new(PredatorPrey::FOXES, 1.0, 12.0, 5),
        vec![0.0, 0.0],
    );
    let portrait = analyze(&model, &slice).expect("analysis should succeed");

    assert_eq!(portrait.nullclines.len(), 2);
    assert_eq!(
        portrait.nullclines[0].curves,
        vec![Nullcline::Vertical { x: 0.0 }, Nullcline::Horizontal { y: 5.0 }]
    );
    assert_eq!(portrait.nullclines[1].component, PredatorPrey::FOXES);
    match portrait.nullclines[1].curves.as_slice() {
        [Nullcline::Horizontal { y }, Nullcline::Vertical { x }] => {
            assert_eq!(*y, 0.0);
            assert!((x - 1.0 / 0.15).abs() < 1e-12);
        }
        other => panic!("unexpected fox nullclines {other:?}"),
    }

    assert_eq!(portrait.field.columns, 6);
    assert_eq!(portrait.field.rows, 5);
    assert_eq!(portrait.field.samples.len(), 30);
    portrait.field.require_regular().expect("no rest points on the grid");
    for sample in &portrait.field.samples {
        let [dx, dy] = sample.direction.expect("regular field");
        assert!((dx.hypot(dy) - 1.0).abs() < 1e-12);
    }
}

#[test]
fn epidemic_phase_portrait_holds_the_threshold_line() {
    let sir = epidemic();
    let slice = PlaneSlice::new(
        AxisSpec::new(Sir::SUSCEPTIBLE, 0.05, 1.0, 6),
        AxisSpec::new(Sir::INFECTED, 0.05, 1.0, 6),
        vec![0.0; 3],
    );
    let portrait = analyze(&sir, &slice).expect("analysis should succeed");
    let infected = &portrait.nullclines[1];
    assert_eq!(infected.component, Sir::INFECTED);
    assert_eq!(
        infected.curves,
        vec![
            Nullcline::Horizontal { y: 0.0 },
            Nullcline::Vertical {
                x: (1.0 / 7.0) / 0.5
            }
        ]
    );
    // With S and I positive, S is always falling.
    for sample in &portrait.field.samples {
        let [dx, _] = sample.direction.expect("regular field");
        assert!(dx < 0.0);
    }
}

#[test]
fn coexistence_is_a_center() {
    let model = rabbits_and_foxes();
    let guess = model.coexistence().expect("positive rates");
    let result = solve_equilibrium(&model, &[guess[0] + 0.5, guess[1] - 0.5], NewtonSettings::default())
        .expect("Newton should converge");
    assert_eq!(result.stability, Stability::Center);
    assert!((result.state[0] - guess[0]).abs() < 1e-8);
    assert!((result.state[1] - guess[1]).abs() < 1e-8);
}
