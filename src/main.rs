use ndarray::{array, Array1};

use sparse_rvm::{train_seeded, BasisSet, RvmSettings, TrainingError};

fn main() -> Result<(), TrainingError> {
    env_logger::init();

    // Eight noisy observations fit with {1, x, x^2, x^3}
    let x = array![1.0, 3.0, 5.0, 6.0, 7.0, 8.0, 8.5, 9.0];
    let y = array![3.0, -2.0, 3.0, 8.0, 20.0, 12.0, 7.0, 10.0];
    let basis = BasisSet::polynomial(3);

    println!("Initial basis : {:?}", basis.names());

    let model = train_seeded(&x, &y, basis, RvmSettings::default(), 0)?;

    println!("Iterations    : {}", model.iterations());
    println!("Relevant basis: {:?}", model.basis().names());
    println!("Weights       : {}", model.mean());
    println!("Alpha         : {}", model.alpha());
    println!("Noise std     : {:.4}", model.noise_stddev());

    // Prediction curve with its ±2σ credible band
    let grid = Array1::linspace(0.0, 10.0, 21);
    let (means, stddevs) = model.predict_many(&grid);
    println!("{:>6} {:>10} {:>10} {:>10}", "x", "mean", "lower", "upper");
    for ((x, mean), sd) in grid.iter().zip(means.iter()).zip(stddevs.iter()) {
        println!(
            "{:>6.2} {:>10.4} {:>10.4} {:>10.4}",
            x,
            mean,
            mean - 2.0 * sd,
            mean + 2.0 * sd
        );
    }

    Ok(())
}
