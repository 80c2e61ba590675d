use clap::Parser;
use trellis_io::cli::{run_decode_command, run_synth_command, Cli, Commands};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            inputs,
            beam_width,
            max_results,
            use_stats,
        } => {
            run_decode_command(&inputs, beam_width, max_results, use_stats)?;
        }
        Commands::Synth {
            text,
            alphabet,
            peak,
            seed,
            out,
        } => {
            run_synth_command(&text, &alphabet, peak, seed, &out)?;
        }
    }

    Ok(())
}
