use tracing::info;

use dbglue::{connect, export, ConnectOptions, PassthroughOp};

fn main() {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt::init();

    info!("Starting dbglue...");

    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: dbglue <database> [SQL]");
        std::process::exit(2);
    }

    let database = &args[1];
    let options = ConnectOptions::new(database)
        .user("cli")
        .password("")
        .no_abort(true);

    let shared = match connect(&options) {
        Ok(shared) => shared,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let Ok(mut conn) = shared.lock() else {
        eprintln!("Connection is unavailable");
        std::process::exit(1);
    };

    if args.len() == 2 {
        match conn.client_call(&PassthroughOp::ClientVersion) {
            Ok(version) => println!("Connected to {} (client {})", database, version),
            Err(e) => eprintln!("Connected to {}, version unavailable: {}", database, e),
        }
        return;
    }

    let sql = args[2..].join(" ");
    match export::to_csv(&mut conn, &sql, &[]) {
        Ok(csv) => print!("{}", csv),
        Err(e) => {
            eprintln!("Query failed: {}", e);
            std::process::exit(1);
        }
    }
}
