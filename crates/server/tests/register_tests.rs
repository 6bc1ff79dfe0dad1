//! Self-registration with email confirmation.

mod common;

use common::*;
use identity_provider::entity::{identity_user, identity_user_claim};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

const EMAIL: &str = "danny.torrance@email.com";
const PASSWORD: &str = "Redrum123";

fn register_form(email: &str, password: &str, confirm: &str) -> Vec<(&'static str, String)> {
    let mut form = authorize_params("openid", CHALLENGE);
    form.push(("email", email.to_string()));
    form.push(("password", password.to_string()));
    form.push(("password_confirm", confirm.to_string()));
    form
}

fn confirmation_link(app: &TestApp) -> url::Url {
    let email = app.mailer.last().expect("confirmation email sent");
    assert_eq!(email.to, EMAIL);
    let start = email.text_body.find("https://").expect("link in body");
    let link = email.text_body[start..]
        .split_whitespace()
        .next()
        .expect("link");
    url::Url::parse(link).expect("valid link")
}

#[tokio::test]
async fn test_register_page_renders() {
    let app = test_app().await;
    let response = app
        .server
        .get("/oauth2/register")
        .add_query_params(&authorize_params("openid", CHALLENGE))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("password_confirm"));
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = test_app().await;

    let response = app
        .server
        .post("/oauth2/register")
        .form(&register_form(EMAIL, "short", "short"))
        .await;
    response.assert_status_see_other();
    let url = location(&response);
    assert_eq!(url.path(), "/oauth2/register");
    assert!(query_param(&url, "error").is_some());
    assert_eq!(identity_user::Entity::find().count(app.db.as_ref()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_register_rejects_mismatched_confirmation() {
    let app = test_app().await;

    let response = app
        .server
        .post("/oauth2/register")
        .form(&register_form(EMAIL, PASSWORD, "Redrum124"))
        .await;
    let url = location(&response);
    assert_eq!(query_param(&url, "error").as_deref(), Some("Passwords do not match"));
    assert!(app.mailer.last().is_none());
}

#[tokio::test]
async fn test_register_existing_confirmed_email_is_refused() {
    let app = test_app().await;

    let response = app
        .server
        .post("/oauth2/register")
        .form(&register_form("jack.torrance@email.com", PASSWORD, PASSWORD))
        .await;
    let url = location(&response);
    assert!(query_param(&url, "error").unwrap().contains("already exists"));
}

#[tokio::test]
async fn test_unconfirmed_account_cannot_sign_in() {
    let app = test_app().await;

    app.server
        .post("/oauth2/register")
        .form(&register_form(EMAIL, PASSWORD, PASSWORD))
        .await
        .assert_status_see_other();

    let mut form = authorize_params("openid", CHALLENGE);
    form.push(("login", EMAIL.to_string()));
    form.push(("password", PASSWORD.to_string()));
    let response = app.server.post("/oauth2/login").form(&form).await;
    let url = location(&response);
    assert_eq!(url.path(), "/oauth2/login");
    assert!(query_param(&url, "error").unwrap().contains("confirm"));
}

#[tokio::test]
async fn test_register_confirm_then_sign_in() {
    let app = test_app().await;

    let response = app
        .server
        .post("/oauth2/register")
        .form(&register_form(EMAIL, PASSWORD, PASSWORD))
        .await;
    response.assert_status_see_other();
    assert!(query_param(&location(&response), "message").is_some());

    let user = identity_user::Entity::find()
        .filter(identity_user::Column::Email.eq(EMAIL))
        .one(app.db.as_ref())
        .await
        .unwrap()
        .expect("user created");
    assert!(!user.email_confirmed);
    assert_eq!(user.user_name, EMAIL);
    let claims = identity_user_claim::Entity::find()
        .filter(identity_user_claim::Column::UserId.eq(&user.id))
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(claims, 1);

    let link = confirmation_link(&app);
    assert_eq!(link.path(), "/oauth2/verify-email");
    assert_eq!(query_param(&link, "client_id").as_deref(), Some(CLIENT_ID));
    let token = query_param(&link, "token").expect("token");

    let response = app
        .server
        .get("/oauth2/verify-email")
        .add_query_params(&link.query_pairs().into_owned().collect::<Vec<_>>())
        .await;
    response.assert_status_see_other();
    let url = location(&response);
    assert_eq!(url.path(), "/oauth2/login");
    assert_eq!(query_param(&url, "login_hint").as_deref(), Some(EMAIL));

    // The link works once
    app.server
        .get("/oauth2/verify-email")
        .add_query_param("token", &token)
        .await
        .assert_status_bad_request();

    let mut form = authorize_params("openid", CHALLENGE);
    form.push(("login", EMAIL.to_string()));
    form.push(("password", PASSWORD.to_string()));
    let response = app.server.post("/oauth2/login").form(&form).await;
    response.assert_status_see_other();
    let url = location(&response);
    assert!(url.as_str().starts_with(REDIRECT_URI));
    assert!(query_param(&url, "code").is_some());
}

#[tokio::test]
async fn test_registering_again_resends_pending_confirmation() {
    let app = test_app().await;

    for _ in 0..2 {
        app.server
            .post("/oauth2/register")
            .form(&register_form(EMAIL, PASSWORD, PASSWORD))
            .await
            .assert_status_see_other();
    }

    let sent = app.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].text_body, sent[1].text_body);
    let users = identity_user::Entity::find()
        .filter(identity_user::Column::Email.eq(EMAIL))
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(users, 1);
}
