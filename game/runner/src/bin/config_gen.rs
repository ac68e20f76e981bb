use clashcore::config::ServerConfig;

fn main() {
    let config = serdeconv::to_toml_string(&ServerConfig::default())
        .expect("Failed to render the default configuration");

    println!("{}", config);
}
