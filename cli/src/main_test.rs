use super::*;

#[test]
fn parses_global_flags_and_login() {
    let cli = Cli::try_parse_from([
        "lms",
        "--base-url",
        "https://lms.example.test/",
        "--token-scheme",
        "single",
        "login",
        "--email",
        "anna@example.test",
        "--password",
        "secret",
    ])
    .unwrap();

    assert_eq!(cli.base_url, "https://lms.example.test/");
    assert_eq!(cli.token_scheme, TokenScheme::Single);
    let Command::Login { email, password } = cli.command else { panic!("expected login") };
    assert_eq!(email, "anna@example.test");
    assert_eq!(password, "secret");
}

#[test]
fn unknown_token_scheme_is_rejected() {
    assert!(Cli::try_parse_from(["lms", "--token-scheme", "cookie", "whoami"]).is_err());
}

#[test]
fn delete_account_defaults_to_unconfirmed() {
    let cli = Cli::try_parse_from(["lms", "delete-account"]).unwrap();
    assert!(matches!(cli.command, Command::DeleteAccount { yes: false }));
}

#[test]
fn users_get_takes_an_id() {
    let cli = Cli::try_parse_from(["lms", "users", "get", "42"]).unwrap();
    let Command::Users(users) = cli.command else { panic!("expected users") };
    assert!(matches!(users.command, UsersSubcommand::Get { id: 42 }));
}

#[test]
fn update_flags_become_a_patch() {
    let cli = Cli::try_parse_from(["lms", "update", "--telegram", "@anna", "--gender", "F"]).unwrap();
    let Command::Update(args) = cli.command else { panic!("expected update") };
    let patch = profile_patch(args);
    assert_eq!(patch.telegram.as_deref(), Some("@anna"));
    assert_eq!(patch.gender, Some(Gender::Female));
    assert_eq!(patch.first_name, None);
}

#[test]
fn empty_update_is_detected() {
    let cli = Cli::try_parse_from(["lms", "update"]).unwrap();
    let Command::Update(args) = cli.command else { panic!("expected update") };
    assert!(profile_patch(args).is_empty());
}

#[test]
fn gender_parser() {
    assert_eq!(parse_gender("m"), Ok(Gender::Male));
    assert_eq!(parse_gender(" female "), Ok(Gender::Female));
    assert!(parse_gender("x").is_err());
}

#[test]
fn missing_upload_names_the_path() {
    let err = read_upload(std::path::Path::new("/nonexistent/lms/avatar.png")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/lms/avatar.png"));
}
