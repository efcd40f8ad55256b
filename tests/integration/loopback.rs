use crate::*;

use otscribe_bench::BenchError;

// ══════════════════════════════════════════════════════════════════════════════
//  In-memory two-party runs
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn parties_agree_at_log2_10() {
    let p = params(10, 2);
    let (a, b) = pipes(2);
    let (alice, bob) = run_pair(a, b, &p).await.unwrap();

    assert_consistent(&alice, &bob);
    assert_eq!(alice.peer_match, Some(true));
    assert_eq!(bob.peer_match, Some(true));
    assert_eq!(alice.phase("rcot").unwrap().count, 1024);
    assert_eq!(alice.phase("rcot_inplace").unwrap().count, 256);

    let lines = alice.lines();
    assert!(lines[0].starts_with("party=1\tphase=setup\t"));
    assert!(lines[1].starts_with("party=1\tphase=rcot\t"));
    assert!(lines[1].contains("\tOTps="));
    assert!(lines[3].starts_with(&format!(
        "party=1\tbytes_sent={}\tbytes_recv={}",
        alice.bytes_sent, alice.bytes_received
    )));
    assert_eq!(lines[4], "party=1\ttranscript=consistent");
}

#[tokio::test]
async fn every_engine_mode_keeps_parties_consistent() {
    for malicious in [false, true] {
        for precompute in [false, true] {
            let mut p = params(9, 3);
            p.engine.malicious = malicious;
            p.engine.precompute = precompute;

            let (a, b) = pipes(3);
            let (alice, bob) = run_pair(a, b, &p).await.unwrap();
            assert_consistent(&alice, &bob);
            assert_eq!(
                alice.peer_match,
                Some(true),
                "malicious={malicious} precompute={precompute}"
            );
        }
    }
}

#[tokio::test]
async fn single_channel_run() {
    let p = params(8, 1);
    let (a, b) = pipes(1);
    let (alice, bob) = run_pair(a, b, &p).await.unwrap();
    assert_consistent(&alice, &bob);
}

#[tokio::test]
async fn fresh_runs_have_fresh_transcripts() {
    let p = params(8, 2);
    let (a, b) = pipes(2);
    let (first, _) = run_pair(a, b, &p).await.unwrap();
    let (a, b) = pipes(2);
    let (second, _) = run_pair(a, b, &p).await.unwrap();

    // Same traffic shape, different random content.
    assert_eq!(first.bytes_sent, second.bytes_sent);
    assert_ne!(first.digests.send, second.digests.send);
}

#[tokio::test]
async fn throughput_is_sane() {
    let mut p = params(14, 2);
    p.engine.batch_limit = Some(4096);
    let (a, b) = pipes(2);
    let (alice, bob) = run_pair(a, b, &p).await.unwrap();

    for report in [&alice, &bob] {
        let bulk = report.phase("rcot").unwrap().throughput().unwrap();
        let inplace = report.phase("rcot_inplace").unwrap().throughput().unwrap();
        for ops in [bulk, inplace] {
            assert!(ops.is_finite() && ops > 0.0, "throughput {ops}");
        }
        let ratio = bulk / inplace;
        assert!((0.01..100.0).contains(&ratio), "bulk {bulk} vs inplace {inplace}");
        assert_eq!(report.phase("setup").unwrap().throughput(), None);
    }
}

#[tokio::test]
async fn longer_digests_show_in_report() {
    let mut p = params(8, 2);
    p.digest = DigestConfig::new(64).unwrap();
    let (a, b) = pipes(2);
    let (alice, bob) = run_pair(a, b, &p).await.unwrap();

    assert_consistent(&alice, &bob);
    assert_eq!(alice.digests.send.to_hex().len(), 128);
    assert!(alice.lines()[3].contains(&format!("send_digest={}", alice.digests.send)));
}

#[tokio::test]
async fn cross_check_can_be_disabled() {
    let mut p = params(8, 2);
    p.cross_check = false;
    let (a, b) = pipes(2);
    let (alice, bob) = run_pair(a, b, &p).await.unwrap();

    assert_consistent(&alice, &bob);
    assert_eq!(alice.peer_match, None);
    assert!(!alice.to_string().contains("transcript="));
    alice.ensure_consistent().unwrap();
}

#[tokio::test]
async fn disagreeing_digest_lengths_are_caught() {
    let p = params(8, 2);
    let mut q = p;
    q.digest = DigestConfig::new(48).unwrap();
    let (a, b) = pipes(2);

    // Party 1 reads the first 64 of party 2's 96 bytes and sees a mismatch,
    // then hangs up on party 2, which is still waiting for 96.
    let (alice, bob) = tokio::join!(
        run::<_, ClearCot<_>>(Role::Alice, a, &p),
        run::<_, ClearCot<_>>(Role::Bob, b, &q),
    );
    let alice = alice.unwrap();
    assert_eq!(alice.peer_match, Some(false));
    assert!(matches!(
        alice.ensure_consistent(),
        Err(BenchError::TranscriptMismatch { .. })
    ));
    assert!(bob.is_err());
}

#[tokio::test]
async fn engine_config_disagreement_fails_both_sides() {
    let p = params(8, 2);
    let mut q = p;
    q.engine.variant = Variant::B11;
    let (a, b) = pipes(2);

    let (alice, bob) = tokio::join!(
        run::<_, ClearCot<_>>(Role::Alice, a, &p),
        run::<_, ClearCot<_>>(Role::Bob, b, &q),
    );
    assert!(matches!(alice, Err(BenchError::Engine(_))));
    assert!(matches!(bob, Err(BenchError::Engine(_))));
}
