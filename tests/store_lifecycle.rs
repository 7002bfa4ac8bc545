use folioblocks::config::{Config, RoleArg};
use folioblocks::context::CoreContext;
use folioblocks::error::CoreError;

fn config_for(dir: &std::path::Path, role: RoleArg) -> Config {
    Config {
        role,
        bind_address: "127.0.0.1".into(),
        bind_port: 0,
        data_dir: dir.to_path_buf(),
        key_file: dir.join(".env"),
        difficulty: 1,
        master_node_limit: 4,
        block_timer_seconds: 7,
        log_level: "warn".into(),
        no_log_file: true,
        peer_retry_budget: 1,
    }
}

#[tokio::test]
async fn bootstrap_then_restart_recovers_genesis_chain() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), RoleArg::Master);

    let first = CoreContext::bootstrap(&config).await;
    assert!(matches!(first, Err(CoreError::Configuration(_))));

    let context = CoreContext::bootstrap(&config).await.unwrap();
    let chain = context.store.snapshot_chain().await;
    assert_eq!(chain.chain.len(), 1);
    assert_eq!(chain.chain[0].id, 0);
    assert_eq!(chain.chain[0].prev_hash_block, "0".repeat(64));
}

#[tokio::test]
async fn restart_preserves_chain_integrity_signature() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), RoleArg::Master);

    CoreContext::bootstrap(&config).await.unwrap_err();
    let first_context = CoreContext::bootstrap(&config).await.unwrap();
    first_context.store.seal_on_shutdown().await.unwrap();
    drop(first_context);

    let second_context = CoreContext::bootstrap(&config).await.unwrap();
    let chain = second_context.store.snapshot_chain().await;
    assert_eq!(chain.chain.len(), 1);
}
