use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use geoguess::{routes::build_router, scoring::MAX_SCORE, EndRoundOutcome, GameError};

mod utils;

use utils::*;

#[tokio::test]
async fn test_round_closes_on_timer_with_absent_player_zeroed() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = &setup.state.multiplayer;

    let game = multiplayer
        .create_game("alice", parameters(3, 30), vec!["bob".to_string()])
        .await
        .unwrap();
    assert_eq!(game.player_count, Some(2));

    let round = multiplayer.new_round("alice", game.id).await.unwrap();

    setup.advance_secs(5);
    multiplayer
        .submit_guess("alice", game.id, round.lat, round.lng)
        .await
        .unwrap();

    setup.advance_secs(5);
    let early = multiplayer.end_round("bob", game.id).await.unwrap();
    assert_eq!(early, EndRoundOutcome::StillActive);
    assert_eq!(early.into_result(), Err(GameError::RoundStillActive));

    setup.advance_secs(21);
    let EndRoundOutcome::Finished { round, guesses } =
        multiplayer.end_round("bob", game.id).await.unwrap()
    else {
        panic!("round should be finished once the timer ran out");
    };

    assert!(round.finished);
    assert_eq!(round.guesses_count, 2);
    assert_eq!(guesses.len(), 2);

    let alice = guesses.iter().find(|g| g.user_id == "alice").unwrap();
    let bob = guesses.iter().find(|g| g.user_id == "bob").unwrap();
    assert_eq!(alice.score, MAX_SCORE);
    assert_eq!(bob.score, 0);
    assert_eq!((bob.lat, bob.lng), (0.0, 0.0));
}

#[tokio::test]
async fn test_round_closes_once_everyone_guessed() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = &setup.state.multiplayer;
    let game = multiplayer
        .create_game("alice", parameters(2, 0), vec!["bob".to_string()])
        .await
        .unwrap();
    let round = multiplayer.new_round("alice", game.id).await.unwrap();

    multiplayer
        .submit_guess("alice", game.id, 1.0, 1.0)
        .await
        .unwrap();
    // Untimed and one guess missing
    assert_eq!(
        multiplayer.end_round("alice", game.id).await.unwrap(),
        EndRoundOutcome::StillActive
    );

    let submitted = multiplayer
        .submit_guess("bob", game.id, round.lat, round.lng)
        .await
        .unwrap();
    assert!(!submitted.round.finished);
    assert_eq!(submitted.round.guesses_count, 2);

    let result = multiplayer
        .end_round("alice", game.id)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(result.guesses.len(), 2);

    assert_app_error(
        multiplayer.submit_guess("bob", game.id, 0.0, 0.0).await,
        "round-already-finished",
    );
}

#[tokio::test]
async fn test_resubmitted_guess_returns_the_stored_one() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = &setup.state.multiplayer;
    let game = multiplayer
        .create_game("alice", parameters(1, 0), vec!["bob".to_string()])
        .await
        .unwrap();
    multiplayer.new_round("alice", game.id).await.unwrap();

    let first = multiplayer
        .submit_guess("alice", game.id, 10.0, 20.0)
        .await
        .unwrap();
    let second = multiplayer
        .submit_guess("alice", game.id, -10.0, -20.0)
        .await
        .unwrap();

    assert_eq!(second.guess, first.guess);
    assert_eq!(second.round.guesses_count, 1);
}

#[tokio::test]
async fn test_concurrent_round_creation_creates_one_round() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = Arc::clone(&setup.state.multiplayer);
    let players: Vec<String> = ["bob", "carol", "dave"].iter().map(|p| p.to_string()).collect();
    let game = multiplayer
        .create_game("alice", parameters(3, 0), players)
        .await
        .unwrap();

    let callers = ["alice", "bob", "carol", "dave", "alice", "bob"];
    let handles: Vec<_> = callers
        .iter()
        .map(|user| {
            let multiplayer = Arc::clone(&multiplayer);
            let user = user.to_string();
            tokio::spawn(async move { multiplayer.new_round(&user, game.id).await })
        })
        .collect();

    let mut round_ids = Vec::new();
    for handle in handles {
        round_ids.push(handle.await.unwrap().unwrap().id);
    }

    round_ids.dedup();
    assert_eq!(round_ids.len(), 1);
    assert_eq!(setup.game_store.round_numbers(game.id).await, vec![1]);
}

#[tokio::test]
async fn test_concurrent_end_round_inserts_sentinels_once() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = Arc::clone(&setup.state.multiplayer);
    let game = multiplayer
        .create_game(
            "alice",
            parameters(2, 10),
            vec!["bob".to_string(), "carol".to_string()],
        )
        .await
        .unwrap();
    multiplayer.new_round("alice", game.id).await.unwrap();
    multiplayer
        .submit_guess("alice", game.id, 5.0, 5.0)
        .await
        .unwrap();
    setup.advance_secs(11);

    let handles: Vec<_> = ["alice", "bob", "carol"]
        .iter()
        .map(|user| {
            let multiplayer = Arc::clone(&multiplayer);
            let user = user.to_string();
            tokio::spawn(async move { multiplayer.end_round(&user, game.id).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap().into_result().unwrap();
        results.push(result);
    }

    for result in &results {
        assert_eq!(result.guesses.len(), 3);
        assert_eq!(result.guesses, results[0].guesses);
    }
    assert_eq!(results[0].round.guesses_count, 3);
}

#[tokio::test]
async fn test_next_round_waits_for_result_window() {
    let setup = TestSetupBuilder::new().with_round_end_delay_secs(5).build();
    let multiplayer = &setup.state.multiplayer;
    let game = multiplayer
        .create_game("alice", parameters(2, 0), vec!["bob".to_string()])
        .await
        .unwrap();
    let first = multiplayer.new_round("alice", game.id).await.unwrap();

    // Still open
    assert_eq!(multiplayer.new_round("bob", game.id).await.unwrap().id, first.id);

    multiplayer.submit_guess("alice", game.id, 0.0, 0.0).await.unwrap();
    multiplayer.submit_guess("bob", game.id, 0.0, 0.0).await.unwrap();
    multiplayer.end_round("alice", game.id).await.unwrap();

    setup.advance_secs(2);
    let during_results = multiplayer.new_round("bob", game.id).await.unwrap();
    assert_eq!(during_results.id, first.id);
    assert!(during_results.finished);

    setup.advance_secs(4);
    let second = multiplayer.new_round("bob", game.id).await.unwrap();
    assert_eq!(second.round_num, 2);
    assert_eq!(setup.game_store.round_numbers(game.id).await, vec![1, 2]);
}

#[tokio::test]
async fn test_full_game_summary_totals() {
    let setup = TestSetupBuilder::new().with_round_end_delay_secs(0).build();
    let multiplayer = &setup.state.multiplayer;
    let game = multiplayer
        .create_game("alice", parameters(2, 0), vec!["bob".to_string()])
        .await
        .unwrap();

    for round_num in 1..=2 {
        let round = multiplayer.new_round("alice", game.id).await.unwrap();
        assert_eq!(round.round_num, round_num);

        if round_num == 1 {
            // Game end is refused while rounds remain
            assert_app_error(multiplayer.end_game("alice", game.id).await, "game-still-active");
        }

        multiplayer
            .submit_guess("alice", game.id, round.lat, round.lng)
            .await
            .unwrap();
        multiplayer
            .submit_guess("bob", game.id, 0.0, 0.0)
            .await
            .unwrap();
        multiplayer.end_round("bob", game.id).await.unwrap();
    }

    assert_app_error(multiplayer.new_round("alice", game.id).await, "round-max-amount");

    let summary = multiplayer.end_game("bob", game.id).await.unwrap();
    assert!(summary.game.finished);
    assert_eq!(summary.guesses.len(), 4);

    let alice = summary.totals.iter().find(|t| t.user_id == "alice").unwrap();
    let bob = summary.totals.iter().find(|t| t.user_id == "bob").unwrap();
    assert_eq!(alice.score, i64::from(2 * MAX_SCORE));
    assert_eq!(alice.guesses, 2);
    assert!(bob.score < alice.score);

    let finished = multiplayer.finished_rounds("bob", game.id).await.unwrap();
    assert_eq!(finished.len(), 2);
}

#[tokio::test]
async fn test_outsiders_are_rejected() {
    let setup = TestSetupBuilder::new().build();
    let multiplayer = &setup.state.multiplayer;
    let game = multiplayer
        .create_game("alice", parameters(2, 0), vec!["bob".to_string()])
        .await
        .unwrap();
    multiplayer.new_round("alice", game.id).await.unwrap();

    assert_app_error(multiplayer.get_game("eve", game.id).await, "wrong-membership");
    assert_app_error(
        multiplayer.submit_guess("eve", game.id, 0.0, 0.0).await,
        "wrong-membership",
    );
    assert_app_error(multiplayer.end_round("eve", game.id).await, "wrong-membership");
    assert_app_error(multiplayer.new_round("eve", game.id).await, "wrong-membership");
}

#[tokio::test]
async fn test_http_end_round_reports_still_active() {
    let setup = TestSetupBuilder::new().build();
    let session = setup
        .state
        .session_service
        .create_guest_session()
        .await
        .unwrap();
    let game = setup
        .state
        .multiplayer
        .create_game(&session.user_id, parameters(2, 60), vec!["bob".to_string()])
        .await
        .unwrap();
    setup
        .state
        .multiplayer
        .new_round(&session.user_id, game.id)
        .await
        .unwrap();

    let app = build_router(setup.state.clone());
    let request = Request::builder()
        .method("POST")
        .uri(format!("/multiplayer/{}/round/end", game.id))
        .header("Authorization", format!("Bearer {}", session.token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
