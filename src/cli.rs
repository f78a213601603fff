use clap::{Parser, Subcommand};

/// Pushgate — campaign broadcast service for mobile push notifications
#[derive(Parser)]
#[command(name = "pushgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the delivery dispatcher
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Manage broadcast campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommands,
    },

    /// Manage registered device tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum CampaignCommands {
    /// Create a campaign and fan it out to all registered users
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
        /// One of: alert, announcement, promotion, system
        #[arg(long, default_value = "announcement")]
        kind: String,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        deep_link: Option<String>,
        /// Deliver inline instead of leaving the campaign for the
        /// running server's dispatcher
        #[arg(long)]
        now: bool,
    },
    /// List recent campaigns with delivery counters
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// List a user's registered devices
    List {
        #[arg(long)]
        user_id: String,
    },
    /// Deactivate a device token
    Deactivate {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        token: String,
    },
}
