use anyhow::{Context, Error};
use product_admin::{
    endpoints::{self, ProductError, Registration},
    Config, Environment, FileStorage, NewProduct, Product, SessionManager,
};
use reqwest::Client;
use std::path::PathBuf;
use structopt::StructOpt;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::from_args();

    let config = args.config()?;
    let state_dir = args.state_dir();
    log::debug!(
        "Starting application against {} with the session in {}",
        config.base_url(),
        state_dir.display()
    );

    let client = Client::builder()
        .user_agent(product_admin::DEFAULT_USER_AGENT)
        .build()?;
    let storage = FileStorage::new(state_dir);
    let manager = SessionManager::new(client, config, storage);

    match args.command {
        Command::Login { email, password } => {
            if !manager.login(&email, &password).await {
                anyhow::bail!("Unable to log in as {}", email);
            }
            if let Some(user) = manager.current_user() {
                println!("Logged in as {} <{}>", user.display_name, user.email);
            }
        },
        Command::Logout => {
            manager.logout();
            println!("Logged out");
        },
        Command::Register {
            name,
            email,
            password,
        } => {
            let registration = Registration {
                name: &name,
                email: &email,
                password: &password,
            };
            endpoints::register(&manager, &registration)
                .await
                .context("Registration failed")?;
            println!("Registered {}, you can now log in", email);
        },
        Command::Whoami => match manager.current_user() {
            Some(user) => {
                println!("{} <{}> ({})", user.display_name, user.email, user.id)
            },
            None => println!("Not logged in"),
        },
        Command::Products { command } => {
            if let Err(e) = run_products(&manager, command).await {
                if let ProductError::Unauthorized = e {
                    eprintln!("Your session has expired, please log in again");
                }
                return Err(e.into());
            }
        },
    }

    Ok(())
}

async fn run_products(
    manager: &SessionManager,
    command: ProductCommand,
) -> Result<(), ProductError> {
    match command {
        ProductCommand::List { category } => {
            let products = endpoints::list_products(manager).await?;

            for product in products.iter().filter(|p| {
                category.as_deref().map_or(true, |c| p.category == c)
            }) {
                print_product(product);
            }
        },
        ProductCommand::Show { id } => {
            let product = endpoints::get_product(manager, &id).await?;
            print_product(&product);
            if !product.description.is_empty() {
                println!("    {}", product.description);
            }
        },
        ProductCommand::Create(details) => {
            let product =
                endpoints::create_product(manager, &details.into()).await?;
            println!("Created {}", product.id);
        },
        ProductCommand::Update { id, details } => {
            let product =
                endpoints::update_product(manager, &id, &details.into())
                    .await?;
            print_product(&product);
        },
        ProductCommand::Delete { id } => {
            endpoints::delete_product(manager, &id).await?;
            println!("Deleted {}", id);
        },
    }

    Ok(())
}

fn print_product(product: &Product) {
    println!(
        "{:<26} {:<30} {:>10.2} {:>6} {}",
        product.id, product.name, product.price, product.stock, product.category
    );
}

#[derive(Debug, StructOpt)]
struct Args {
    #[structopt(
        long = "api-url",
        help = "The API's base URL (overrides $PRODUCT_ADMIN_API_URL)"
    )]
    api_url: Option<String>,
    #[structopt(
        long = "state-dir",
        parse(from_os_str),
        help = "Where to keep the session between runs"
    )]
    state_dir: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Command,
}

impl Args {
    fn config(&self) -> Result<Config, Error> {
        let config = match self.api_url {
            Some(ref url) => {
                Config::resolve(Environment::default(), Some(url.as_str()))?
            },
            None => Config::from_env()?,
        };

        Ok(config)
    }

    fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }

        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".product-admin"),
            None => PathBuf::from(".product-admin"),
        }
    }
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(about = "Log in and remember the session")]
    Login {
        #[structopt(short = "e", long = "email", help = "Your email address")]
        email: String,
        #[structopt(short = "p", long = "password", help = "Your password")]
        password: String,
    },
    #[structopt(about = "Forget the saved session")]
    Logout,
    #[structopt(about = "Create a new account")]
    Register {
        #[structopt(short = "n", long = "name", help = "Your full name")]
        name: String,
        #[structopt(short = "e", long = "email", help = "Your email address")]
        email: String,
        #[structopt(short = "p", long = "password", help = "Your password")]
        password: String,
    },
    #[structopt(about = "Show who is logged in")]
    Whoami,
    #[structopt(about = "Manage products")]
    Products {
        #[structopt(subcommand)]
        command: ProductCommand,
    },
}

#[derive(Debug, StructOpt)]
enum ProductCommand {
    #[structopt(about = "List every product")]
    List {
        #[structopt(long = "category", help = "Only show this category")]
        category: Option<String>,
    },
    #[structopt(about = "Show a single product")]
    Show { id: String },
    #[structopt(about = "Add a product")]
    Create(ProductDetails),
    #[structopt(about = "Replace a product's details")]
    Update {
        id: String,
        #[structopt(flatten)]
        details: ProductDetails,
    },
    #[structopt(about = "Remove a product")]
    Delete { id: String },
}

#[derive(Debug, StructOpt)]
struct ProductDetails {
    #[structopt(long = "name")]
    name: String,
    #[structopt(long = "price")]
    price: f64,
    #[structopt(long = "description", default_value = "")]
    description: String,
    #[structopt(long = "category", default_value = "")]
    category: String,
    #[structopt(long = "stock", default_value = "0")]
    stock: u32,
}

impl From<ProductDetails> for NewProduct {
    fn from(details: ProductDetails) -> NewProduct {
        NewProduct::new(details.name, details.price)
            .with_description(details.description)
            .with_category(details.category)
            .with_stock(details.stock)
    }
}
