use docker_compose_config::ComposeFile;
use indoc::indoc;
use pretty_assertions::assert_eq;
use stackyard::{
	AppError,
	fs::write_file,
	resolver::resolve_for_deploy,
	variables::{EnvFile, SecretsDir, VarMap, VariableSources},
};
use tempfile::tempdir;

fn sources_with_env_file(content: &str) -> Result<VariableSources, Box<dyn std::error::Error>> {
	let dir = tempdir()?;
	let path = dir.path().join(".env");

	write_file(&path, content)?;

	Ok(VariableSources {
		env_file: EnvFile::load(&path)?,
		..Default::default()
	})
}

#[test]
fn persisted_values_are_used() -> Result<(), Box<dyn std::error::Error>> {
	let sources = sources_with_env_file("FOO=bar\n")?;

	let doc = ComposeFile::from_yaml(indoc! {r#"
		services:
		  app:
		    image: "busybox:${FOO}"
		    command: ["sh", "-c", "echo $$HOME"]
		    environment:
		      - GREETING=$FOO
	"#})?;

	let resolved = resolve_for_deploy(&doc, &sources)?;
	let app = &resolved.services["app"];

	assert_eq!(app.image.as_deref(), Some("busybox:bar"));
	assert_eq!(app.env_entries(), vec!["GREETING=bar"]);
	assert_eq!(app.command_tokens(), vec!["sh", "-c", "echo $$HOME"]);

	Ok(())
}

#[test]
fn the_process_environment_wins_for_plain_variables() -> Result<(), Box<dyn std::error::Error>> {
	let mut sources = sources_with_env_file("FOO=bar\nDB_PASSWORD=stored\n")?;

	sources.process = VarMap::from([
		("FOO".to_string(), "baz".to_string()),
		("DB_PASSWORD".to_string(), "leaked".to_string()),
	]);

	let doc = ComposeFile::from_yaml(indoc! {"
		services:
		  app:
		    environment:
		      - FOO=${FOO}
		      - DB_PASSWORD=${DB_PASSWORD}
	"})?;

	let resolved = resolve_for_deploy(&doc, &sources)?;

	assert_eq!(
		resolved.services["app"].env_entries(),
		vec!["FOO=baz", "DB_PASSWORD=stored"]
	);

	Ok(())
}

#[test]
fn unresolved_variables_block_the_deployment() -> Result<(), Box<dyn std::error::Error>> {
	let sources = sources_with_env_file("FOO=bar\n")?;

	let doc = ComposeFile::from_yaml(indoc! {"
		services:
		  app:
		    image: busybox
		    environment:
		      - A=${FOO}
		      - B=${MISSING}
		    volumes:
		      - ${DATA_DIR}:/data
	"})?;

	let Err(AppError::UnresolvedVariables(missing)) = resolve_for_deploy(&doc, &sources) else {
		panic!("The deployment was not blocked");
	};

	assert_eq!(missing, vec!["DATA_DIR", "MISSING"]);

	Ok(())
}

#[test]
fn conflicting_credentials_are_fatal() {
	let sources = VariableSources {
		env_file: EnvFile {
			vars: VarMap::from([("db_password".to_string(), "one".to_string())]),
		},
		secrets: SecretsDir {
			vars: VarMap::from([("DB_PASSWORD".to_string(), "two".to_string())]),
		},
		..Default::default()
	};

	let error = resolve_for_deploy(&ComposeFile::default(), &sources).unwrap_err();

	assert!(error.is_fatal());
	assert!(matches!(error, AppError::CredentialConflict { key } if key == "DB_PASSWORD"));
}
