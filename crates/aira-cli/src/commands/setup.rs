//! Setup command for initial Aira provisioning
//!
//! Creates the organization, an admin user and the first API key. The
//! command is non-interactive so it can run in provisioning scripts.

use clap::Args;
use colored::Colorize;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info};

use aira_auth::{ApiKeyService, Role};
use aira_core::ServerConfig;
use aira_entities::{organizations, users};

#[derive(Args)]
pub struct SetupCommand {
    /// Database connection URL
    #[arg(long, env = "AIRA_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Organization name
    #[arg(long)]
    pub organization: String,

    /// Admin user email address
    #[arg(long)]
    pub admin_email: String,

    /// Admin user display name
    #[arg(long, default_value = "Admin")]
    pub admin_name: String,

    /// Name of the first API key
    #[arg(long, default_value = "default")]
    pub key_name: String,
}

impl SetupCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let database_url = match self.database_url.clone() {
            Some(url) => url,
            None => ServerConfig::from_env()?.database_url,
        };

        debug!("Initializing database connection...");
        let db = aira_database::establish_connection(&database_url).await?;

        // Normalize the email before any lookups
        let email = self.admin_email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') || !email.contains('.') {
            anyhow::bail!("Invalid admin email address: {}", self.admin_email);
        }

        let existing_user = users::Entity::find()
            .filter(users::Column::Email.eq(&email))
            .one(db.as_ref())
            .await?;

        if existing_user.is_some() {
            info!("User with email {} already exists", email);
            println!();
            println!(
                "{}",
                "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_yellow()
            );
            println!(
                "{}",
                "   ⚠️  Admin account already exists!"
                    .bright_yellow()
                    .bold()
            );
            println!(
                "{}",
                "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_yellow()
            );
            println!();
            println!(
                "{} {}",
                "Email:".bright_white().bold(),
                email.bright_cyan()
            );
            println!();
            println!(
                "{}",
                "This admin account was created previously.".bright_white()
            );
            println!(
                "{}",
                "Create additional API keys through the authenticated API.".bright_white()
            );
            println!();
            return Ok(());
        }

        let slug = slugify(&self.organization);
        if slug.is_empty() {
            anyhow::bail!(
                "Organization name '{}' does not produce a usable slug",
                self.organization
            );
        }

        let organization = match organizations::Entity::find()
            .filter(organizations::Column::Slug.eq(&slug))
            .one(db.as_ref())
            .await?
        {
            Some(existing) => {
                info!("Organization '{}' already exists, reusing it", existing.name);
                existing
            }
            None => {
                organizations::ActiveModel {
                    name: Set(self.organization.clone()),
                    slug: Set(slug),
                    ..Default::default()
                }
                .insert(db.as_ref())
                .await?
            }
        };

        let user = users::ActiveModel {
            organization_id: Set(organization.id),
            name: Set(self.admin_name.clone()),
            email: Set(email.clone()),
            role: Set(Role::Admin.as_str().to_string()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await?;
        debug!("Created admin user {} ({})", user.id, user.email);

        let api_key_service = ApiKeyService::new(db.clone());
        let created = api_key_service
            .create_api_key(user.id, &self.key_name, None)
            .await?;

        println!();
        println!(
            "{}",
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_green()
        );
        println!(
            "{}",
            "   🎉 Aira setup completed successfully!"
                .bright_white()
                .bold()
        );
        println!(
            "{}",
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_green()
        );
        println!();
        println!(
            "{} {}",
            "Organization:".bright_white().bold(),
            organization.name.bright_cyan()
        );
        println!(
            "{} {}",
            "Admin email:".bright_white().bold(),
            email.bright_cyan()
        );
        println!(
            "{} {}",
            "API key:".bright_white().bold(),
            created.api_key.bright_yellow().bold()
        );
        println!();
        println!(
            "{}",
            "⚠️  IMPORTANT: Save this API key now!"
                .bright_yellow()
                .bold()
        );
        println!(
            "{}",
            "This is the only time it will be displayed.".bright_white()
        );
        println!();
        println!("{}", "Authenticate requests with:".bright_white());
        println!();
        println!(
            "  {} {}",
            "$".bright_cyan(),
            format!(
                "curl -H 'Authorization: Bearer {}' http://localhost:3000/api/webhooks",
                created.api_key
            )
            .bright_green()
        );
        println!();
        println!(
            "{}",
            "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_green()
        );
        println!();

        Ok(())
    }
}

/// Lowercases and collapses anything that is not alphanumeric into single
/// dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}
