fn main() {
    if let Err(err) = csv_to_sql::run() {
        csv_to_sql::console::error(&format!("error: {err:#}"));
        std::process::exit(1);
    }
}
