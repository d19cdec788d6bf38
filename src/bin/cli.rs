use clap::{Parser, Subcommand};
use profilesite::{
    db,
    forms::RegistrationForm,
    repositories::user_repository::SqliteUserRepository,
    services::{FsPictureStore, PictureService, UserService},
};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(name = "profilesite-cli")]
#[command(about = "CLI tool for managing profile site users", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create {
        /// Full name shown on the profile
        #[arg(short = 'n', long)]
        full_name: String,

        /// Unique username
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// List all users
    List {
        /// Maximum number of users to display
        #[arg(short, long, default_value_t = 100)]
        limit: i64,

        /// Offset for pagination
        #[arg(short = 'o', long, default_value_t = 0)]
        offset: i64,
    },
}

fn get_password(prompt: &str) -> anyhow::Result<String> {
    use std::io::{self, Write};
    print!("{}: ", prompt);
    io::stdout().flush()?;

    Ok(rpassword::read_password()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let picture_dir = std::env::var("PICTURE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("static/profile_pics"));

    // Connect to database
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Initialize services
    let user_repository = Arc::new(SqliteUserRepository::new(pool));
    let pictures = Arc::new(PictureService::new(Arc::new(FsPictureStore::new(
        picture_dir,
    ))));
    let user_service = UserService::new(user_repository, pictures);

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Create {
                full_name,
                username,
                email,
                password,
            } => {
                let (password, confirm_password) = match password {
                    Some(pw) => (pw.clone(), pw),
                    None => (get_password("Password")?, get_password("Confirm password")?),
                };

                let form = RegistrationForm {
                    full_name,
                    username,
                    email,
                    password,
                    confirm_password,
                    csrf_token: String::new(),
                };

                let request = match form.validate() {
                    Ok(request) => request,
                    Err(errors) => {
                        for (field, message) in errors.iter() {
                            eprintln!("❌ {}: {}", field, message);
                        }
                        std::process::exit(1);
                    }
                };

                match user_service.register(request).await {
                    Ok(user) => {
                        println!("✅ User created successfully!");
                        println!("  ID: {}", user.id);
                        println!("  Username: {}", user.username);
                        println!("  Email: {}", user.email);
                    }
                    Err(err) => {
                        eprintln!("❌ Failed to create user: {}", err);
                        std::process::exit(1);
                    }
                }
            }

            UserCommands::List { limit, offset } => {
                match user_service.list_users(Some(limit), Some(offset)).await {
                    Ok(users) => {
                        if users.is_empty() {
                            println!("No users found.");
                        } else {
                            println!(
                                "{:<5} {:<20} {:<40} {:<20}",
                                "ID", "Username", "Email", "Created"
                            );
                            println!("{}", "-".repeat(85));
                            for user in users {
                                println!(
                                    "{:<5} {:<20} {:<40} {:<20}",
                                    user.id,
                                    user.username,
                                    user.email,
                                    user.created_at.format("%Y-%m-%d %H:%M")
                                );
                            }
                            let total = user_service.count_users().await?;
                            println!("{} user(s) in total", total);
                        }
                    }
                    Err(err) => {
                        eprintln!("❌ Failed to list users: {}", err);
                        std::process::exit(1);
                    }
                }
            }
        },
    }

    Ok(())
}
