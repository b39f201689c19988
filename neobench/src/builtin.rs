//! Built-in workloads and their dataset populators.

use neobench_value::Value;

use crate::bolt::BoltDriver;
use crate::output::Output;

pub const TPCB_LIKE: &str = r#"
:set aid random(1, 100000 * $scale)
:set bid random(1, 1 * $scale)
:set tid random(1, 10 * $scale)
:set delta random(-5000, 5000)

MATCH (account:Account {aid:$aid})
SET account.balance = account.balance + $delta;

MATCH (account:Account {aid:$aid}) RETURN account.balance;
MATCH (teller:Teller {tid: $tid}) SET teller.balance = teller.balance + $delta;
MATCH (branch:Branch {bid: $bid}) SET branch.balance = branch.balance + $delta;
CREATE (:History { tid: $tid, bid: $bid, aid: $aid, delta: $delta, mtime: timestamp() });
"#;

pub const MATCH_ONLY: &str = r#"
:set aid random(1, 100000 * $scale)
MATCH (account:Account {aid:$aid}) RETURN account.balance;
"#;

/// Source text for a named builtin workload.
pub fn source(name: &str) -> Option<&'static str> {
    match name {
        "tpcb-like" => Some(TPCB_LIKE),
        "match-only" => Some(MATCH_ONLY),
        _ => None,
    }
}

/// Both builtins run against the TPC-B-like dataset.
pub fn init(name: &str, scale: i64, driver: &BoltDriver, out: &dyn Output) -> anyhow::Result<()> {
    match name {
        "tpcb-like" | "match-only" => init_tpcb_like(scale, driver, out),
        other => anyhow::bail!("builtin workload '{other}' has no initialiser"),
    }
}

/// Populate branches, tellers and accounts for the TPC-B-like workload.
/// Account creation is batched and picks up from however many accounts
/// already exist, so a partial init can be re-run.
fn init_tpcb_like(scale: i64, driver: &BoltDriver, out: &dyn Output) -> anyhow::Result<()> {
    let num_branches = scale;
    let num_tellers = 10 * scale;
    let num_accounts = 100_000 * scale;

    out.status("[init] create schema");
    for (label, property) in [("Branch", "bid"), ("Teller", "tid"), ("Account", "aid")] {
        driver.run(
            &format!(
                "CREATE CONSTRAINT IF NOT EXISTS FOR (n:{label}) REQUIRE n.{property} IS UNIQUE"
            ),
            &[],
        )?;
    }

    out.status("[init] create branches & tellers");
    driver.run(
        "UNWIND range(1, $nBranches) AS branchId \
         MERGE (b:Branch {bid: branchId}) SET b.balance = 0",
        &[("nBranches", Value::Int(num_branches))],
    )?;
    driver.run(
        "UNWIND range(1, $nTellers) AS tellerId \
         MERGE (t:Teller {tid: tellerId}) SET t.balance = 0",
        &[("nTellers", Value::Int(num_tellers))],
    )?;

    out.status("[init] create accounts");
    let existing = driver.count("MATCH (:Account) RETURN count(*) AS n")?;

    let batch_size: i64 = 5_000;
    let num_batches = num_accounts / batch_size;
    for batch_no in 0..=num_batches {
        let start_account = existing.max(batch_size * batch_no + 1);
        let end_account = num_accounts.min(start_account + batch_size);
        if end_account <= start_account {
            continue;
        }
        driver.run(
            "UNWIND range($startAccount, $endAccount) AS accountId \
             CREATE (a:Account {aid: accountId, balance: 0})",
            &[
                ("startAccount", Value::Int(start_account)),
                ("endAccount", Value::Int(end_account)),
            ],
        )?;
        out.status(&format!(
            "[init] create accounts {:.0}%",
            100.0 * batch_no as f64 / num_batches.max(1) as f64
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neobench_script::{parse, Command};

    #[test]
    fn builtin_scripts_parse() {
        for name in ["tpcb-like", "match-only"] {
            let text = source(name).expect("known builtin");
            let script =
                parse(&format!("builtin:{name}"), text, 1.0).expect("builtin script parses");
            assert!(!script.commands.is_empty());
        }
        assert!(source("ldbc-like").is_none());
    }

    #[test]
    fn tpcb_statements_reference_their_params() {
        let script = parse("builtin:tpcb-like", TPCB_LIKE, 1.0).expect("parses");
        let queries: Vec<_> = script
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Query { remote_params, .. } => Some(remote_params.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[0], vec!["aid".to_string(), "delta".into()]);
        assert_eq!(queries[1], vec!["aid".to_string()]);
        assert_eq!(
            queries[4],
            vec!["aid".to_string(), "bid".into(), "delta".into(), "tid".into()]
        );
    }
}
