use common::{EntryKind, LedgerEntry, PostWager, Side, StoreEvent, WagerError, WagerState};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use server::config::Settings;
use server::Services;

const SEED: &str = r#"
[[seed.users]]
name = "alice"
balance = 100

[[seed.users]]
name = "bob"
balance = 100

[[seed.users]]
name = "carol"
balance = 0

[[seed.markets]]
id = "lebron-james-points"
player = "LeBron James"
points = 25.5
coefficients = [0.0, 0.0, -4.0, 250.0]
"#;

async fn services_with(extra: &str) -> Services {
    let settings = Settings::parse_toml(&format!("{extra}\n{SEED}")).unwrap();
    server::start(&settings).await.unwrap()
}

async fn services() -> Services {
    services_with("").await
}

fn post(odds: i32, stake: Decimal) -> PostWager {
    PostWager {
        player: "LeBron James".into(),
        points: 27.0,
        odds,
        side: Side::Over,
        stake,
    }
}

#[tokio::test]
async fn posting_debits_the_poster_and_stores_the_acceptor_price() {
    let services = services().await;

    let wager = services.wagers.post("alice", post(-150, dec!(50))).await.unwrap();
    assert_eq!(wager.odds.value(), 150);
    assert_eq!(wager.state(), WagerState::Open);
    assert_eq!(wager.poster, "alice");

    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(50));
    assert_eq!(services.database.get_wager(&wager.id).await.unwrap(), wager);
    assert_eq!(services.database.list_open().await.unwrap(), vec![wager.clone()]);

    let ledger = services.database.get_ledger("alice").await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, dec!(-50));
    assert_eq!(ledger[0].kind, EntryKind::Post);
    assert_eq!(ledger[0].wager, wager.id);
}

#[tokio::test]
async fn accepting_debits_the_counter_stake() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(50))).await.unwrap();

    let matched = services.wagers.accept("bob", &posted.id).await.unwrap();
    assert_eq!(matched.state(), WagerState::Matched);
    assert_eq!(matched.acceptor(), Some("bob"));
    assert_eq!(matched.acceptor_stake().unwrap().amount(), dec!(33.33));

    assert_eq!(services.database.balance("bob").await.unwrap(), dec!(66.67));
    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(50));
    assert!(services.database.list_open().await.unwrap().is_empty());
    assert_eq!(services.database.list_live().await.unwrap(), vec![matched.clone()]);
    assert_eq!(services.database.get_wager(&posted.id).await.unwrap(), matched);
}

#[tokio::test]
async fn favourite_price_halves_the_counter_stake() {
    let services = services_with("[ledger]\noverdraft = \"allow\"").await;
    let posted = services.wagers.post("alice", post(200, dec!(100))).await.unwrap();
    assert_eq!(posted.odds.value(), -200);

    let matched = services.wagers.accept("bob", &posted.id).await.unwrap();
    assert_eq!(matched.acceptor_stake().unwrap().amount(), dec!(50.00));
    assert_eq!(services.database.balance("bob").await.unwrap(), dec!(50));
}

#[tokio::test]
async fn a_matched_wager_cannot_be_accepted_again() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(10))).await.unwrap();
    services.wagers.accept("bob", &posted.id).await.unwrap();

    let again = services.wagers.accept("carol", &posted.id).await;
    assert_eq!(again, Err(WagerError::AlreadyMatched(posted.id.clone())));
    assert_eq!(services.database.balance("carol").await.unwrap(), dec!(0));
}

#[tokio::test]
async fn exactly_one_concurrent_accept_wins() {
    let mut seed = String::from("[ledger]\noverdraft = \"reject\"\n");
    for i in 0..8 {
        seed.push_str(&format!("[[seed.users]]\nname = \"racer{i}\"\nbalance = 100\n"));
    }
    let services = services_with(&seed).await;
    let posted = services.wagers.post("alice", post(-100, dec!(20))).await.unwrap();

    let attempts = (0..8).map(|i| {
        let wagers = services.wagers.clone();
        let id = posted.id.clone();
        tokio::spawn(async move { wagers.accept(&format!("racer{i}"), &id).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(result, &Err(WagerError::AlreadyMatched(posted.id.clone())));
    }

    let mut debited = Decimal::ZERO;
    for i in 0..8 {
        debited += dec!(100) - services.database.balance(&format!("racer{i}")).await.unwrap();
    }
    assert_eq!(debited, dec!(20));
}

#[tokio::test]
async fn invalid_posts_store_nothing() {
    let services = services().await;

    assert_eq!(
        services.wagers.post("alice", post(-150, dec!(0))).await,
        Err(WagerError::InvalidStake(dec!(0)))
    );
    assert!(matches!(
        services.wagers.post("alice", post(-150, dec!(-5))).await,
        Err(WagerError::InvalidStake(_))
    ));
    assert_eq!(
        services.wagers.post("alice", post(0, dec!(5))).await,
        Err(WagerError::InvalidOdds)
    );
    assert_eq!(
        services.wagers.post("nobody", post(-150, dec!(5))).await,
        Err(WagerError::UnknownUser("nobody".into()))
    );

    assert!(services.database.list_live().await.unwrap().is_empty());
    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(100));
}

#[tokio::test]
async fn unknown_wagers_are_not_found() {
    let services = services().await;
    assert_eq!(
        services.database.get_wager("missing").await,
        Err(WagerError::NotFound("missing".into()))
    );
    assert_eq!(
        services.wagers.accept("bob", "missing").await,
        Err(WagerError::NotFound("missing".into()))
    );
}

#[tokio::test]
async fn overdraft_policy_decides_short_balances() {
    let rejecting = services().await;
    assert_eq!(
        rejecting.wagers.post("carol", post(-150, dec!(5))).await,
        Err(WagerError::InsufficientFunds {
            balance: dec!(0),
            required: dec!(5),
        })
    );
    assert!(rejecting.database.list_live().await.unwrap().is_empty());

    let posted = rejecting.wagers.post("alice", post(-150, dec!(30))).await.unwrap();
    assert!(matches!(
        rejecting.wagers.accept("carol", &posted.id).await,
        Err(WagerError::InsufficientFunds { .. })
    ));
    assert!(rejecting.database.get_wager(&posted.id).await.unwrap().is_open());

    let allowing = services_with("[ledger]\noverdraft = \"allow\"").await;
    allowing.wagers.post("carol", post(-150, dec!(5))).await.unwrap();
    assert_eq!(allowing.database.balance("carol").await.unwrap(), dec!(-5));
}

#[tokio::test]
async fn posters_cannot_accept_their_own_wager() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(10))).await.unwrap();
    assert_eq!(
        services.wagers.accept("alice", &posted.id).await,
        Err(WagerError::SelfAccept)
    );
    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(90));
}

#[tokio::test]
async fn resolution_pays_the_pot_to_the_winner() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(50))).await.unwrap();

    assert_eq!(
        services.wagers.resolve(&posted.id, "alice").await,
        Err(WagerError::NotMatched(posted.id.clone()))
    );

    services.wagers.accept("bob", &posted.id).await.unwrap();
    assert_eq!(
        services.wagers.resolve(&posted.id, "carol").await,
        Err(WagerError::InvalidWinner("carol".into()))
    );

    let resolved = services.wagers.resolve(&posted.id, "bob").await.unwrap();
    assert_eq!(resolved.state(), WagerState::Resolved);
    assert_eq!(resolved.winner(), Some("bob"));
    assert_eq!(services.database.balance("bob").await.unwrap(), dec!(150.00));
    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(50));

    assert_eq!(
        services.wagers.resolve(&posted.id, "alice").await,
        Err(WagerError::AlreadyResolved(posted.id.clone()))
    );

    let kinds: Vec<_> = services
        .database
        .get_ledger("bob")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| (entry.kind, entry.amount))
        .collect();
    assert_eq!(
        kinds,
        vec![(EntryKind::Accept, dec!(-33.33)), (EntryKind::Payout, dec!(83.33))]
    );
}

#[tokio::test]
async fn subscribers_hear_about_commits() {
    let services = services().await;
    let mut changes = services.database.subscribe();

    services.wagers.post("alice", post(-150, dec!(10))).await.unwrap();
    assert_eq!(changes.recv().await.unwrap(), StoreEvent::Wagers);
    assert_eq!(changes.recv().await.unwrap(), StoreEvent::Balances);

    // rejected transitions commit nothing
    let _ = services.wagers.post("alice", post(0, dec!(10))).await;
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn markets_are_seeded_and_priced() {
    let services = services().await;
    let markets = services.database.get_all_markets().await.unwrap();
    assert_eq!(markets.len(), 1);

    let market = services.database.get_market("lebron-james-points").await.unwrap();
    // -4·20 + 250 + 200 below the line, negated for OVER
    assert_eq!(market.quote(20.0, Side::Over).unwrap().value(), -370);
    assert_eq!(market.quote(30.0, Side::Under).unwrap().to_string(), "+130");
}

#[tokio::test]
async fn oversized_stakes_are_rejected_and_the_store_keeps_running() {
    let services = services_with("[ledger]\noverdraft = \"allow\"").await;

    assert_eq!(
        services.wagers.post("alice", post(-150, Decimal::MAX)).await,
        Err(WagerError::InvalidStake(Decimal::MAX))
    );
    services.wagers.post("alice", post(-150, dec!(5))).await.unwrap();
    assert_eq!(services.database.balance("alice").await.unwrap(), dec!(95));
}

#[tokio::test]
async fn store_refuses_a_transition_from_a_stale_read() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(50))).await.unwrap();
    services.wagers.accept("bob", &posted.id).await.unwrap();

    // another writer still holding the open wager
    let stake = posted.required_counter_stake().unwrap();
    let stale = posted.clone().matched("carol", stake).unwrap();
    let entry = LedgerEntry::debit("carol", &posted.id, stake.amount(), EntryKind::Accept);
    assert_eq!(
        services.database.write_wager(stale, entry, false).await,
        Err(WagerError::AlreadyMatched(posted.id.clone()))
    );

    assert_eq!(services.database.balance("carol").await.unwrap(), dec!(0));
    assert!(services.database.get_ledger("carol").await.unwrap().is_empty());
    let stored = services.database.get_wager(&posted.id).await.unwrap();
    assert_eq!(stored.acceptor(), Some("bob"));
}

#[tokio::test]
async fn store_refuses_an_overdrawing_debit() {
    let services = services().await;
    let posted = services.wagers.post("alice", post(-150, dec!(50))).await.unwrap();

    let stake = posted.required_counter_stake().unwrap();
    let matched = posted.clone().matched("carol", stake).unwrap();
    let entry = LedgerEntry::debit("carol", &posted.id, stake.amount(), EntryKind::Accept);
    assert_eq!(
        services.database.write_wager(matched, entry, true).await,
        Err(WagerError::InsufficientFunds {
            balance: dec!(0),
            required: dec!(33.33),
        })
    );
    assert!(services.database.get_wager(&posted.id).await.unwrap().is_open());
    assert_eq!(services.database.balance("carol").await.unwrap(), dec!(0));
}
