use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};

use densefit::fit::NonlinearFit;

#[derive(FromArgs)]
/// Fit y = amplitude * exp(-rate * t) with Levenberg-Marquardt
struct Args {
    /// true amplitude
    #[argh(option, default = "2.0")]
    amplitude: f64,

    /// true decay rate
    #[argh(option, default = "0.7")]
    rate: f64,

    /// half width of the uniform noise added to each sample
    #[argh(option, default = "0.0")]
    noise: f64,

    /// maximum number of iterations
    #[argh(option, default = "100")]
    max_iterations: usize,

    /// stop once every parameter step is below this value
    #[argh(option, default = "1e-10")]
    tolerance: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut rng = StdRng::seed_from_u64(0);
    let samples: Vec<(f64, f64)> = (0..50)
        .map(|i| {
            let t = i as f64 * 0.2;
            let noise = if args.noise > 0.0 {
                rng.random_range(-args.noise..args.noise)
            } else {
                0.0
            };
            (t, args.amplitude * (-args.rate * t).exp() + noise)
        })
        .collect();

    let mut fit = NonlinearFit::new(vec![1.0, 0.1])?;
    for _ in 0..args.max_iterations {
        let (a, k) = (fit.params()[0], fit.params()[1]);
        for &(t, y) in &samples {
            let e = (-k * t).exp();
            fit.add_error_derivative(e)?;
            fit.add_error_derivative(-a * t * e)?;
            fit.add_error(a * e - y)?;
        }

        let outcome = fit.step()?;
        println!(
            "iter {:3}: chi2 = {:.6e}, lambda = {:.1e}, {}",
            fit.iterations(),
            outcome.chi_squared,
            outcome.lambda,
            if outcome.accepted { "accepted" } else { "rejected" }
        );

        if fit.is_converged(args.tolerance) {
            break;
        }
    }

    let best = fit.best_params();
    let cov = fit.covariance()?;
    println!(
        "amplitude: {:.6} +/- {:.6} (true {})",
        best[0],
        cov[(0, 0)].sqrt(),
        args.amplitude
    );
    println!(
        "rate:      {:.6} +/- {:.6} (true {})",
        best[1],
        cov[(1, 1)].sqrt(),
        args.rate
    );

    Ok(())
}
