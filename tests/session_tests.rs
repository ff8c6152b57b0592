mod common;

use common::*;
use portal_verifier::session::{authenticate, AcquireError, Session};
use portal_verifier::ErrorKind;

fn session(portal: &ScriptedPortal) -> Session<ScriptedPortal> {
    let config = test_config();
    Session::new(
        portal.clone(),
        config.portal.login.clone(),
        config.portal.login_form_selector.clone(),
    )
}

#[tokio::test]
async fn test_no_login_form_hands_out_owned_pages() {
    let portal = ScriptedPortal::new(LoginGate::Never);
    let mut session = session(&portal);

    {
        let page = session.acquire_page(&url("1")).await.unwrap();
        assert!(!page.is_primary());
        assert_eq!(portal.log(|l| l.open_pages()), 1);
    }

    assert_eq!(portal.log(|l| l.open_pages()), 0);
    assert!(!session.state().is_authenticated());
    assert_eq!(session.authentications(), 0);
}

#[tokio::test]
async fn test_first_challenge_promotes_page_to_primary() {
    let portal = ScriptedPortal::new(LoginGate::UntilAuthenticated);
    let mut session = session(&portal);

    {
        let page = session.acquire_page(&url("1")).await.unwrap();
        assert!(page.is_primary());
    }

    assert!(session.state().is_authenticated());
    assert_eq!(session.authentications(), 1);
    // Primary stays open between records
    assert_eq!(portal.log(|l| l.open_pages()), 1);
    assert_eq!(
        portal.log(|l| l.filled.clone()),
        vec![
            ("input[name=UserName]".to_string(), "operator".to_string()),
            ("input[name=Password]".to_string(), "secret".to_string()),
        ]
    );

    session.close();
    assert!(!session.state().is_authenticated());
    assert_eq!(portal.log(|l| l.open_pages()), 0);
}

#[tokio::test]
async fn test_later_challenge_uses_primary_without_second_login() {
    let portal = ScriptedPortal::new(LoginGate::EveryNewPage);
    let mut session = session(&portal);

    drop(session.acquire_page(&url("1")).await.unwrap());
    let page = session.acquire_page(&url("2")).await.unwrap();
    assert!(page.is_primary());
    drop(page);

    assert_eq!(session.authentications(), 1);
    assert_eq!(portal.log(|l| l.authentications), 1);
    // Page 2 was opened and closed; only the primary remains
    assert_eq!(portal.log(|l| l.opened), 2);
    assert_eq!(portal.log(|l| l.open_pages()), 1);
}

#[tokio::test]
async fn test_navigation_failure_is_record_level() {
    let portal = ScriptedPortal::new(LoginGate::Never).with_unreachable_page("9");
    let mut session = session(&portal);

    match session.acquire_page(&url("9")).await {
        Err(AcquireError::Record(e)) => assert!(e.to_string().contains("ERR_CONNECTION_RESET")),
        Err(AcquireError::Fatal(e)) => panic!("unexpected fatal error: {}", e),
        Ok(_) => panic!("navigation should have failed"),
    }
    assert_eq!(portal.log(|l| l.open_pages()), 0);
}

#[tokio::test]
async fn test_rejected_login_is_fatal() {
    let portal = ScriptedPortal::new(LoginGate::UntilAuthenticated).with_rejected_login();
    let mut session = session(&portal);

    match session.acquire_page(&url("1")).await {
        Err(AcquireError::Fatal(e)) => assert_eq!(e.kind(), ErrorKind::Authentication),
        Err(AcquireError::Record(e)) => panic!("expected fatal error, got {}", e),
        Ok(_) => panic!("login should have failed"),
    }
    assert!(!session.state().is_authenticated());
    assert_eq!(portal.log(|l| l.open_pages()), 0);
}

#[tokio::test]
async fn test_dropping_session_closes_primary() {
    let portal = ScriptedPortal::new(LoginGate::UntilAuthenticated);
    {
        let mut session = session(&portal);
        drop(session.acquire_page(&url("1")).await.unwrap());
        assert_eq!(portal.log(|l| l.open_pages()), 1);
    }
    assert_eq!(portal.log(|l| l.open_pages()), 0);
}

#[tokio::test]
async fn test_authenticate_selects_facility_before_location() {
    use portal_verifier::PortalBrowser;

    let portal = ScriptedPortal::new(LoginGate::UntilAuthenticated);
    let page = portal.open_page().await.unwrap();
    authenticate(&page, &test_config().portal.login).await.unwrap();

    assert_eq!(
        portal.log(|l| l.selected.clone()),
        vec![
            ("select#facility".to_string(), "12".to_string()),
            ("select#location".to_string(), "7".to_string()),
        ]
    );
    assert_eq!(portal.log(|l| l.authentications), 1);
}

#[test]
fn test_fixture_loads_with_configured_schema() {
    use portal_verifier::input::load_records;

    let config = test_config();
    let loaded = load_records(&load_fixture("records.csv"), &config.input.schema()).unwrap();

    assert_eq!(loaded.records.len(), 3);
    assert_eq!(loaded.skipped_rows, 1);
    assert_eq!(loaded.records[2].key, "2003");
    assert_eq!(loaded.records[2].row(), vec!["2003", "Pérez, Eva", "06/05/2024", "Guardia"]);
}
