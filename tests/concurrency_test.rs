mod common;

use anyhow::Result;
use common::{open_ana, service_in, test_service};
use std::time::Duration;
use teller::application::AccountService;
use teller::storage::StoreConfig;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_from_stale_snapshot() -> Result<()> {
    let (service, _temp) = test_service()?;
    let account = open_ana(&service).await?;

    // Both operations start from the same 1000.00 snapshot
    let (first, second) = tokio::join!(
        service.deposit(&account, 10000),
        service.deposit(&account, 10000)
    );
    first?;
    second?;

    assert_eq!(service.find_account("001").await?.balance, 120000);

    let history = service.history(&account).await?;
    assert_eq!(history.len(), 2);
    let mut balances: Vec<i64> = history.iter().map(|e| e.resulting_balance).collect();
    balances.sort();
    assert_eq!(balances, vec![110000, 120000]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_across_service_instances() -> Result<()> {
    let (service, temp) = test_service()?;
    let account = open_ana(&service).await?;
    let other = service_in(temp.path());

    let mut handles = Vec::new();
    for svc in [std::sync::Arc::new(service), std::sync::Arc::new(other)] {
        for _ in 0..3 {
            let svc = svc.clone();
            let account = account.clone();
            handles.push(tokio::spawn(async move {
                svc.deposit(&account, 1000).await
            }));
        }
    }
    for handle in handles {
        handle.await??;
    }

    let reader = service_in(temp.path());
    assert_eq!(reader.find_account("001").await?.balance, 106000);

    let mut ids: Vec<u64> = reader
        .history(&account)
        .await?
        .iter()
        .map(|e| e.entry_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

    assert!(reader.check_integrity().await?.is_ok());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service()?;
    let account = open_ana(&service).await?;

    let (a, b, c) = tokio::join!(
        service.withdraw(&account, 40000),
        service.withdraw(&account, 40000),
        service.withdraw(&account, 40000)
    );
    let succeeded = [a.is_ok(), b.is_ok(), c.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(succeeded, 2);

    assert_eq!(service.find_account("001").await?.balance, 20000);
    assert_eq!(service.history(&account).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_lock_files_left_by_a_dead_process_do_not_block() -> Result<()> {
    let (service, temp) = test_service()?;
    let account = open_ana(&service).await?;

    // A killed process leaves its lock files behind, naming a pid that is gone
    for name in ["cuentas.txt.uow.lock", "cuentas.txt.lock", "movimientos.txt.lock"] {
        std::fs::write(temp.path().join(name), "999999\n")?;
    }

    let impatient = AccountService::new(
        StoreConfig::in_dir(temp.path()).with_lock_timeout(Duration::from_millis(200)),
    );
    let receipt = impatient.deposit(&account, 10000).await?;
    assert_eq!(receipt.account.balance, 110000);

    let receipt = impatient.withdraw(&account, 5000).await?;
    assert_eq!(receipt.account.balance, 105000);

    Ok(())
}
