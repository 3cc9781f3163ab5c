use clap::{Args, CommandFactory, Parser, Subcommand};

mod commands;
mod context;

use commands::endpoint::SideOptions;

/// Replica - OCI Artifact Replication
///
/// Copies images and other OCI artifacts between registries, and deletes them.
#[derive(Parser, Debug)]
#[command(name = "replica")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display version information
    Version,
    /// Copy an artifact from one registry to another
    #[command(visible_alias = "cp")]
    Copy {
        /// Source reference (host/repo:tag or host/repo@digest)
        src: String,
        /// Destination reference (host/repo:tag or host/repo@digest)
        dst: String,
        /// Bandwidth cap in KB/s (0 means unlimited)
        #[arg(long, default_value_t = 0)]
        speed: u32,
        /// Upload blobs in resumable chunks
        #[arg(long)]
        chunked: bool,
        /// Replace a differing artifact already present at the destination
        #[arg(long = "override")]
        override_existing: bool,
        #[command(flatten)]
        src_side: SrcArgs,
        #[command(flatten)]
        dst_side: DstArgs,
    },
    /// Delete a manifest from a registry
    #[command(visible_alias = "rm")]
    Delete {
        /// Reference to delete (host/repo:tag or host/repo@digest)
        dst: String,
        #[command(flatten)]
        dst_side: DstArgs,
    },
    /// Delete a tag from a registry, keeping the manifest
    DeleteTag {
        /// Tag to delete (host/repo:tag)
        dst: String,
        #[command(flatten)]
        dst_side: DstArgs,
    },
    /// Print an addition of a chart artifact (VALUES.YAML, README.MD, DEPENDENCIES)
    ChartAddition {
        /// Chart reference (host/repo:version or host/repo@digest)
        reference: String,
        /// Addition name: VALUES.YAML, README.MD or DEPENDENCIES
        name: String,
        #[command(flatten)]
        src_side: SrcArgs,
    },
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Connection options of the source registry
#[derive(Args, Debug)]
struct SrcArgs {
    /// Talk to the source registry over plain HTTP
    #[arg(long)]
    src_plain_http: bool,
    /// Skip TLS certificate verification for the source registry
    #[arg(long)]
    src_insecure: bool,
    /// Source registry username
    #[arg(long, env = "REPLICA_SRC_USERNAME")]
    src_username: Option<String>,
    /// Source registry password
    #[arg(long, env = "REPLICA_SRC_PASSWORD", hide_env_values = true)]
    src_password: Option<String>,
}

/// Connection options of the destination registry
#[derive(Args, Debug)]
struct DstArgs {
    /// Talk to the destination registry over plain HTTP
    #[arg(long)]
    dst_plain_http: bool,
    /// Skip TLS certificate verification for the destination registry
    #[arg(long)]
    dst_insecure: bool,
    /// Destination registry username
    #[arg(long, env = "REPLICA_DST_USERNAME")]
    dst_username: Option<String>,
    /// Destination registry password
    #[arg(long, env = "REPLICA_DST_PASSWORD", hide_env_values = true)]
    dst_password: Option<String>,
}

impl From<SrcArgs> for SideOptions {
    fn from(args: SrcArgs) -> Self {
        SideOptions::new(
            args.src_plain_http,
            args.src_insecure,
            args.src_username,
            args.src_password,
        )
    }
}

impl From<DstArgs> for SideOptions {
    fn from(args: DstArgs) -> Self {
        SideOptions::new(
            args.dst_plain_http,
            args.dst_insecure,
            args.dst_username,
            args.dst_password,
        )
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ctx = context::AppContext::build(context::VerbosityLevel::from_count(cli.verbose));

    let result = match cli.command {
        Commands::Version => {
            commands::version::print_version();
            Ok(())
        }
        Commands::Copy {
            src,
            dst,
            speed,
            chunked,
            override_existing,
            src_side,
            dst_side,
        } => {
            let args = commands::copy::CopyArgs {
                src,
                dst,
                speed,
                chunked,
                override_existing,
                src_side: src_side.into(),
                dst_side: dst_side.into(),
            };
            commands::copy::handle_copy(&ctx, args).await
        }
        Commands::Delete { dst, dst_side } => {
            commands::delete::handle_delete(&ctx, &dst, dst_side.into(), false).await
        }
        Commands::DeleteTag { dst, dst_side } => {
            commands::delete::handle_delete(&ctx, &dst, dst_side.into(), true).await
        }
        Commands::ChartAddition {
            reference,
            name,
            src_side,
        } => commands::addition::handle_addition(&ctx, &reference, &name, src_side.into()).await,
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}
