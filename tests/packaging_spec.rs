use std::path::{Path, PathBuf};

use adea::config::Config;
use figment::Jail;

fn repo_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(name)
}

fn dockerfile() -> String {
    std::fs::read_to_string(repo_file("Dockerfile")).expect("Dockerfile is missing")
}

#[test]
fn image_exposes_the_api_port() {
    assert!(dockerfile().lines().any(|l| l.trim() == "EXPOSE 5000"));
}

#[test]
fn image_ships_binary_and_config_in_workdir() {
    let dockerfile = dockerfile();
    assert!(dockerfile.contains("WORKDIR /app"));
    assert!(dockerfile.contains("COPY --from=builder /build/target/release/adea /app/adea"));
    assert!(dockerfile.contains("COPY config.yaml /app/config.yaml"));
}

#[test]
fn image_starts_the_server_without_arguments() {
    let dockerfile = dockerfile();
    let cmd = dockerfile
        .lines()
        .rev()
        .find(|l| l.starts_with("CMD"))
        .expect("no CMD instruction");
    assert_eq!(cmd.trim(), r#"CMD ["./adea"]"#);
}

#[test]
fn shipped_config_binds_the_exposed_port() {
    Jail::expect_with(|jail| {
        jail.clear_env();
        let config = Config::load(Some(&repo_file("config.yaml"))).map_err(|e| e.to_string())?;

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.path, Some(PathBuf::from("data/adea.db")));
        assert!(config.openai.api_key.is_none());
        Ok(())
    });
}
