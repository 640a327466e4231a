use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};

use densefit::fit::LeastSquaresFit;

#[derive(FromArgs)]
/// Fit a straight line to noisy samples of y = slope * x + intercept
struct Args {
    /// number of samples
    #[argh(option, short = 'n', default = "20")]
    num_points: usize,

    /// true slope of the line
    #[argh(option, default = "2.0")]
    slope: f64,

    /// true intercept of the line
    #[argh(option, default = "1.0")]
    intercept: f64,

    /// standard deviation of the uniform noise added to each sample
    #[argh(option, default = "0.1")]
    noise: f64,

    /// random seed
    #[argh(option, default = "0")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut rng = StdRng::seed_from_u64(args.seed);
    // a uniform distribution on [-a, a] has standard deviation a / sqrt(3)
    let half_width = args.noise * 3f64.sqrt();

    let mut fit = LeastSquaresFit::new(args.num_points, 2)?;
    for i in 0..args.num_points {
        let x = i as f64;
        let y = args.slope * x + args.intercept + rng.random_range(-half_width..=half_width);
        if args.noise > 0.0 {
            fit.add_error(args.noise)?;
        }
        fit.add_row(&[x, 1.0], y)?;
    }

    let solution = fit.solve()?;
    log::info!("singular values: {:?}", solution.singular_values);

    let sigma_slope = solution.covariance[(0, 0)].sqrt();
    let sigma_intercept = solution.covariance[(1, 1)].sqrt();
    println!(
        "slope:     {:.6} +/- {:.6} (true {})",
        solution.coefficients[0], sigma_slope, args.slope
    );
    println!(
        "intercept: {:.6} +/- {:.6} (true {})",
        solution.coefficients[1], sigma_intercept, args.intercept
    );
    println!("chi2:      {:.6}", solution.chi_squared);

    Ok(())
}
