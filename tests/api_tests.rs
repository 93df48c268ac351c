// tests/api_tests.rs
//
// End-to-end flows against a real Postgres. Run with:
//   DATABASE_URL=postgres://... cargo test -- --ignored

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use souklou::{
    config::Config,
    grading::{NewAttempt, NewQuestionAnswer, PgStore, QuizStore},
    routes,
    state::AppState,
    utils::jwt::verify_quiz_token,
};
use sqlx::postgres::PgPoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        quiz_token_ttl: 600,
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let app = routes::create_router(AppState { pool, config });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

/// Registers a fresh user with the given role and returns its bearer token.
async fn register_and_login(client: &reqwest::Client, address: &str, role: &str) -> String {
    let username = format!("{}_{}", &role[..1], &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    let response = client
        .post(format!("{address}/api/auth/register"))
        .json(&json!({ "username": username, "password": password, "role": role }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let login: Value = client
        .post(format!("{address}/api/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    format!("Bearer {}", login["token"].as_str().expect("Token not found"))
}

fn score(value: &Value) -> f64 {
    value["score"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value["score"].as_f64())
        .expect("score missing")
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn duplicate_username_conflicts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let body = json!({ "username": format!("d_{}", &uuid::Uuid::new_v4().to_string()[..8]), "password": "password123" });

    let first = client.post(format!("{address}/api/auth/register")).json(&body).send().await.unwrap();
    let second = client.post(format!("{address}/api/auth/register")).json(&body).send().await.unwrap();

    assert_eq!(first.status().as_u16(), 201);
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn teacher_authors_and_student_takes_quiz() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register_and_login(&client, &address, "teacher").await;
    let student = register_and_login(&client, &address, "student").await;

    // 1. Teacher creates a fiche with three questions.
    let fiche: Value = client
        .post(format!("{address}/api/fiches"))
        .header("Authorization", &teacher)
        .json(&json!({
            "title": "Les fractions",
            "description": "Bases",
            "content": "<p>Une fraction...</p><script>alert(1)</script>",
            "category": "Mathématiques"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let fiche_id = fiche["id"].as_i64().unwrap();
    assert!(!fiche["content"].as_str().unwrap().contains("script"));

    // Empty quiz is not available yet.
    let empty = client
        .get(format!("{address}/api/fiches/{fiche_id}/quiz"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status().as_u16(), 404);

    for i in 0..3 {
        let created: Value = client
            .post(format!("{address}/api/fiches/{fiche_id}/questions"))
            .header("Authorization", &teacher)
            .json(&json!({
                "text": format!("Question {i}"),
                "order": i,
                "answers": [
                    { "text": "Right", "is_correct": true, "order": 0 },
                    { "text": "Wrong", "is_correct": false, "order": 1 }
                ]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(created["warnings"].as_array().unwrap().is_empty());
    }

    // Students cannot author questions on someone else's fiche.
    let forbidden = client
        .post(format!("{address}/api/fiches/{fiche_id}/questions"))
        .header("Authorization", &student)
        .json(&json!({
            "text": "Sneaky",
            "answers": [{ "text": "a" }, { "text": "b" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    // 2. Student opens the quiz: no correctness flags leak.
    let quiz: Value = client
        .get(format!("{address}/api/fiches/{fiche_id}/quiz"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let questions = quiz["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions[0]["answers"][0].get("is_correct").is_none());

    // 3. Two right, one wrong.
    let mut answers = HashMap::new();
    for (i, q) in questions.iter().enumerate() {
        let picked = if i == 2 { &q["answers"][1] } else { &q["answers"][0] };
        answers.insert(
            format!("question_{}", q["id"].as_i64().unwrap()),
            picked["id"].as_i64().unwrap(),
        );
    }

    let submit = client
        .post(format!("{address}/api/fiches/{fiche_id}/quiz/submit"))
        .header("Authorization", &student)
        .json(&json!({ "quiz_token": quiz["quiz_token"], "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(submit.status().as_u16(), 201);
    let attempt: Value = submit.json().await.unwrap();
    assert_eq!(attempt["correct_answers"], 2);
    assert_eq!(attempt["total_questions"], 3);
    assert!((score(&attempt) - 66.67).abs() < 1e-9);
    assert_eq!(attempt["passed"], true);
    assert!(attempt["time_spent_seconds"].is_i64());

    // 4. Review lists answers in question order.
    let attempt_id = attempt["id"].as_i64().unwrap();
    let review: Value = client
        .get(format!("{address}/api/attempts/{attempt_id}"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let texts: Vec<&str> = review["answers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["question_text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["Question 0", "Question 1", "Question 2"]);

    // Another student cannot see it, the author can.
    let stranger = register_and_login(&client, &address, "student").await;
    let hidden = client
        .get(format!("{address}/api/attempts/{attempt_id}"))
        .header("Authorization", &stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status().as_u16(), 403);

    let results: Value = client
        .get(format!("{address}/api/fiches/{fiche_id}/results"))
        .header("Authorization", &teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["stats"]["total_attempts"], 1);
    assert_eq!(results["stats"]["unique_students"], 1);

    // 5. Student history.
    let mine: Value = client
        .get(format!("{address}/api/results/me"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["stats"]["total_attempts"], 1);
    assert_eq!(mine["stats"]["passed_attempts"], 1);
}

/// Creates a published fiche with one question per entry of `questions`,
/// each entry listing the correctness flags of its answers.
async fn create_fiche_with_questions(
    client: &reqwest::Client,
    address: &str,
    teacher: &str,
    title: &str,
    questions: &[&[bool]],
) -> i64 {
    let fiche: Value = client
        .post(format!("{address}/api/fiches"))
        .header("Authorization", teacher)
        .json(&json!({
            "title": title,
            "description": "Révisions",
            "content": "<p>Résumé</p>",
            "category": "Histoire"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let fiche_id = fiche["id"].as_i64().unwrap();

    for (i, flags) in questions.iter().enumerate() {
        let answers: Vec<Value> = flags
            .iter()
            .enumerate()
            .map(|(j, &is_correct)| json!({ "text": format!("Answer {j}"), "is_correct": is_correct, "order": j }))
            .collect();
        let response = client
            .post(format!("{address}/api/fiches/{fiche_id}/questions"))
            .header("Authorization", teacher)
            .json(&json!({ "text": format!("Question {i}"), "order": i, "answers": answers }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }

    fiche_id
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn author_reads_back_and_edits_questions() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register_and_login(&client, &address, "teacher").await;
    let student = register_and_login(&client, &address, "student").await;

    let fiche_id =
        create_fiche_with_questions(&client, &address, &teacher, "Révolution", &[&[false, true], &[false, false]]).await;

    let listed: Value = client
        .get(format!("{address}/api/fiches/{fiche_id}/questions"))
        .header("Authorization", &teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let questions = listed["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0]["question"]["answers"][1]["is_correct"], true);
    assert!(questions[0]["warnings"].as_array().unwrap().is_empty());
    assert_eq!(questions[1]["warnings"].as_array().unwrap().len(), 1);

    // Students cannot see correctness flags.
    let hidden = client
        .get(format!("{address}/api/fiches/{fiche_id}/questions"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status().as_u16(), 403);

    // Edit the first question, keeping its answers by id and adding one.
    let question = &questions[0]["question"];
    let question_id = question["id"].as_i64().unwrap();
    let kept: Vec<Value> = question["answers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| json!({ "id": a["id"], "text": a["text"], "is_correct": a["is_correct"], "order": a["order"] }))
        .collect();
    let mut answers = kept.clone();
    answers.push(json!({ "text": "Answer 2", "is_correct": false, "order": 2 }));

    let updated = client
        .put(format!("{address}/api/questions/{question_id}"))
        .header("Authorization", &teacher)
        .json(&json!({ "text": "Question 0 (bis)", "order": 0, "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status().as_u16(), 200);

    let single: Value = client
        .get(format!("{address}/api/questions/{question_id}"))
        .header("Authorization", &teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(single["question"]["text"], "Question 0 (bis)");
    let reloaded = single["question"]["answers"].as_array().unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded[0]["id"], kept[0]["id"]);
    assert_eq!(reloaded[1]["id"], kept[1]["id"]);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn fiches_can_be_searched_and_pending_work_is_listed() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register_and_login(&client, &address, "teacher").await;
    let marker = uuid::Uuid::new_v4().to_string()[..8].to_string();

    let complete =
        create_fiche_with_questions(&client, &address, &teacher, &format!("Napoléon {marker}"), &[&[true, false]]).await;
    let broken = create_fiche_with_questions(
        &client,
        &address,
        &teacher,
        &format!("Louis XIV {marker}"),
        &[&[false, false], &[true, false]],
    )
    .await;
    let empty = create_fiche_with_questions(&client, &address, &teacher, &format!("Vide {marker}"), &[]).await;

    let found: Value = client
        .get(format!("{address}/api/fiches"))
        .query(&[("search", format!("napoléon {marker}"))])
        .header("Authorization", &teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<i64> = found["fiches"].as_array().unwrap().iter().map(|f| f["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![complete]);
    assert!(found["categories"].as_array().unwrap().iter().any(|c| c == "Histoire"));

    let pending: Value = client
        .get(format!("{address}/api/authoring/pending"))
        .header("Authorization", &teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let without_correct = pending["questions_without_correct_answer"].as_array().unwrap();
    assert_eq!(without_correct.len(), 1);
    assert_eq!(without_correct[0]["fiche_id"], broken);
    let without_questions = pending["published_fiches_without_questions"].as_array().unwrap();
    assert_eq!(without_questions.len(), 1);
    assert_eq!(without_questions[0]["id"], empty);

    let student = register_and_login(&client, &address, "student").await;
    let forbidden = client
        .get(format!("{address}/api/authoring/pending"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn reopening_a_quiz_keeps_the_start_time() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register_and_login(&client, &address, "teacher").await;
    let student = register_and_login(&client, &address, "student").await;
    let fiche_id = create_fiche_with_questions(&client, &address, &teacher, "Chronologie", &[&[true, false]]).await;

    let first: Value = client
        .get(format!("{address}/api/fiches/{fiche_id}/quiz"))
        .header("Authorization", &student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first_token = first["quiz_token"].as_str().unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let again: Value = client
        .get(format!("{address}/api/fiches/{fiche_id}/quiz"))
        .query(&[("quiz_token", first_token)])
        .header("Authorization", &student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let started_at = |token: &str| {
        verify_quiz_token(token, "test_secret_for_integration_tests")
            .expect("quiz token should verify")
            .started_at
    };
    assert_eq!(started_at(again["quiz_token"].as_str().unwrap()), started_at(first_token));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn failed_answer_insert_rolls_back_the_attempt() {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to migrate database");

    let student_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password, role) VALUES ($1, 'x', 'teacher') RETURNING id",
    )
    .bind(format!("r_{}", &uuid::Uuid::new_v4().to_string()[..8]))
    .fetch_one(&pool)
    .await
    .unwrap();
    let fiche_id: i64 = sqlx::query_scalar(
        "INSERT INTO fiches (title, description, content, author_id) VALUES ('T', 'D', 'C', $1) RETURNING id",
    )
    .bind(student_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let store = PgStore::new(pool.clone());
    let now = Utc::now();
    let attempt = NewAttempt {
        student_id,
        fiche_id,
        score: Decimal::ZERO,
        total_questions: 1,
        correct_answers: 0,
        time_spent_seconds: None,
        completed_at: now,
    };
    // No such question or answer: the foreign keys reject the row.
    let answers = vec![NewQuestionAnswer {
        question_id: i64::MAX,
        selected_answer_id: i64::MAX,
        is_correct: false,
        answered_at: now,
    }];

    assert!(store.record_attempt(attempt, answers).await.is_err());

    let attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts WHERE student_id = $1")
        .bind(student_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attempts, 0);
}
