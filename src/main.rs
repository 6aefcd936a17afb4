use letsesign_enclave_worker::config::WorkerConfig;
use letsesign_enclave_worker::worker;

fn main() {
    let config = WorkerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    worker::run(&config.mail_template_folder, config.host_base_url_override);
}
