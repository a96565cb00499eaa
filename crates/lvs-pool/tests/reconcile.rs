//! Pool reconciliation against a recording executor

use lvs_pool::{LvsService, RecordingExecutor, Server, VirtualService};
use std::collections::BTreeSet;
use std::sync::Arc;

fn servers(hosts: &str) -> BTreeSet<Server> {
    hosts.chars().map(|h| Server::new(h.to_string())).collect()
}

fn setup() -> (LvsService, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::new());
    let service = VirtualService::parse("tcp", "127.0.0.1", 80, "rr", false).unwrap();
    (LvsService::new("http", service, executor.clone()), executor)
}

#[tokio::test]
async fn test_shrink_and_grow_orders_add_edit_remove() {
    let (mut service, executor) = setup();
    service.reconcile(servers("abc")).await.unwrap();
    executor.clear();

    service.reconcile(servers("cde")).await.unwrap();

    assert_eq!(
        executor.batches(),
        vec![vec![
            "-a -t 127.0.0.1:80 -r d",
            "-a -t 127.0.0.1:80 -r e",
            "-e -t 127.0.0.1:80 -r c",
            "-d -t 127.0.0.1:80 -r a",
            "-d -t 127.0.0.1:80 -r b",
        ]]
    );
    assert_eq!(service.installed(), &servers("cde"));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (mut service, executor) = setup();
    service.reconcile(servers("xyz")).await.unwrap();
    let first = executor.commands();

    service.reconcile(servers("xyz")).await.unwrap();

    assert_eq!(executor.commands(), first);
    assert_eq!(executor.batches().len(), 1);
    assert_eq!(service.installed(), &servers("xyz"));
}

#[tokio::test]
async fn test_reconcile_from_empty_only_adds() {
    let (mut service, executor) = setup();
    let desired = servers("pqrst");

    service.reconcile(desired.clone()).await.unwrap();

    let commands = executor.commands();
    assert_eq!(commands.len(), desired.len());
    assert!(commands.iter().all(|c| c.starts_with("-a ")));
    assert!(service.installed().iter().all(Server::is_pooled));
}

#[tokio::test]
async fn test_weight_change_is_edited() {
    let (mut service, executor) = setup();
    let installed: BTreeSet<Server> = [Server::new("cp1001").with_weight(10)].into();
    service.reconcile(installed).await.unwrap();

    let reweighted: BTreeSet<Server> = [Server::new("cp1001").with_weight(25)].into();
    service.reconcile(reweighted).await.unwrap();

    assert_eq!(
        executor.last_batch().unwrap(),
        vec!["-e -t 127.0.0.1:80 -r cp1001 -w 25"]
    );
}

#[tokio::test]
async fn test_reconcile_to_empty_removes_everything() {
    let (mut service, executor) = setup();
    service.reconcile(servers("ab")).await.unwrap();

    service.reconcile(BTreeSet::new()).await.unwrap();

    assert_eq!(
        executor.last_batch().unwrap(),
        vec!["-d -t 127.0.0.1:80 -r a", "-d -t 127.0.0.1:80 -r b"]
    );
    assert!(service.installed().is_empty());
}

#[tokio::test]
async fn test_executor_failure_still_updates_bookkeeping() {
    let (mut service, executor) = setup();
    executor.set_failing(true);

    let err = service.reconcile(servers("ab")).await.unwrap_err();
    assert_eq!(err.error_code(), "TABLE_APPLY_ERROR");
    assert_eq!(service.installed(), &servers("ab"));

    let mut server = Server::new("c");
    let err = service.pool_one(&mut server).await.unwrap_err();
    assert_eq!(err.error_code(), "TABLE_APPLY_ERROR");
    assert!(server.is_pooled());
    assert!(service.is_installed(&server));

    let err = service.depool_one(&mut server).await.unwrap_err();
    assert_eq!(err.error_code(), "TABLE_APPLY_ERROR");
    assert!(!server.is_pooled());
    assert!(!service.is_installed(&server));
}

#[tokio::test]
async fn test_pool_and_depool_mix_with_reconcile() {
    let (mut service, executor) = setup();
    service.reconcile(servers("ab")).await.unwrap();

    let mut c = Server::new("c");
    service.init_server(&mut c);
    service.pool_one(&mut c).await.unwrap();
    let mut a = Server::new("a");
    service.depool_one(&mut a).await.unwrap();
    assert_eq!(service.installed(), &servers("bc"));

    executor.clear();
    service.reconcile(servers("bc")).await.unwrap();
    assert!(executor.batches().is_empty());

    service.reconcile(servers("bcd")).await.unwrap();
    assert_eq!(
        executor.commands(),
        vec![
            "-a -t 127.0.0.1:80 -r d",
            "-e -t 127.0.0.1:80 -r b",
            "-e -t 127.0.0.1:80 -r c",
        ]
    );
}
