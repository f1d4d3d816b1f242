use docker_compose_config::{
	normalize::{env_from_canonical, env_to_canonical, mapping_from_canonical, mapping_to_canonical},
	*,
};
use indoc::indoc;
use pretty_assertions::assert_eq;

const DOCUMENT: &str = indoc! {r#"
	x-common: &common
	  restart: unless-stopped
	services:
	  web:
	    image: nginx:1.27
	    environment:
	      - TZ=Europe/Berlin
	      - EMPTY=
	      - PASSTHROUGH
	    labels:
	      com.example.team: platform
	    ports:
	      - "8080:80"
	      - target: 443
	        published: 8443
	    volumes:
	      - ./site:/usr/share/nginx/html:ro
	      - cache:/var/cache/nginx
	    healthcheck:
	      test: ["CMD", "true"]
	  db:
	    image: postgres:17
	    environment:
	      POSTGRES_DB: app
	      MAX_CONNECTIONS: 100
	    networks:
	      backend:
	        aliases: [database]
	volumes:
	  cache:
	networks:
	  backend:
	    driver: bridge
"#};

#[test]
fn unknown_fields_survive_a_round_trip() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(DOCUMENT)?;

	assert!(doc.extensions.contains_key("x-common"));
	assert!(doc.services["web"].extensions.contains_key("healthcheck"));

	let reparsed = ComposeFile::from_yaml(&to_canonical_yaml(&doc)?)?;

	assert_eq!(reparsed, doc);

	Ok(())
}

#[test]
fn environment_shapes_are_lossless() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(DOCUMENT)?;

	for service in doc.services.values() {
		let shape = FieldShape::of_list_or_map(service.environment.as_ref());
		let entries = env_to_canonical(service.environment.as_ref());

		let Some(ListOrMap::Map(original)) = &service.environment else {
			assert_eq!(env_from_canonical(&entries, shape), service.environment);
			continue;
		};

		// Values that were not strings come back as strings with the same text
		let Some(ListOrMap::Map(rebuilt)) = env_from_canonical(&entries, shape) else {
			panic!("map shape was not preserved");
		};

		assert_eq!(rebuilt.keys().collect::<Vec<_>>(), original.keys().collect::<Vec<_>>());

		for (key, value) in original {
			assert_eq!(
				rebuilt[key].as_ref().map(ToString::to_string),
				value.as_ref().map(ToString::to_string)
			);
		}
	}

	Ok(())
}

#[test]
fn labels_keep_their_shape() {
	let list = ListOrMap::List(vec!["a=1".to_string(), "b=2".to_string()]);

	let map = mapping_to_canonical(Some(&list));

	assert_eq!(
		mapping_from_canonical(&map, FieldShape::of_list_or_map(Some(&list))),
		Some(list)
	);
}

#[test]
fn mounts_and_ports_are_classified() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(DOCUMENT)?;
	let web = &doc.services["web"];

	let mounts: Vec<MountSpec> = web.volumes.iter().filter_map(ServiceVolume::mount).collect();

	assert_eq!(mounts[0].kind, MountKind::Bind);
	assert!(mounts[0].read_only);
	assert_eq!(mounts[1].kind, MountKind::Volume);
	assert_eq!(web.volumes[1].named_volume().as_deref(), Some("cache"));
	assert_eq!(web.volumes[0].named_volume(), None);

	let first = web.ports[0].mapping().unwrap();

	assert_eq!(first.host_port.as_deref(), Some("8080"));
	assert_eq!(first.container_port_number(), Some(80));

	let long = web.ports[1].mapping().unwrap();

	assert_eq!(long.container_port, "443");
	assert_eq!(long.host_port.as_deref(), Some("8443"));

	Ok(())
}

#[test]
fn unrecognized_values_are_kept() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(indoc! {"
		services:
		  odd:
		    image: busybox
		    environment: 42
	"})?;

	let mut service = doc.services["odd"].clone();

	assert_eq!(
		FieldShape::of_list_or_map(service.environment.as_ref()),
		FieldShape::Unrecognized
	);
	assert!(!service.edit_environment("odd", |entries| entries.push("A=1".to_string())));
	assert_eq!(service, doc.services["odd"]);

	Ok(())
}

#[test]
fn config_content_is_emitted_byte_for_byte() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(indoc! {r#"
		configs:
		  motd:
		    content: "line one  \r\nline two\n"
		  nginx:
		    content: |
		      server {
		        listen 80;
		      }
	"#})?;

	let reparsed = ComposeFile::from_yaml(&to_canonical_yaml(&doc)?)?;

	assert_eq!(
		reparsed.configs["motd"].content.as_deref(),
		Some("line one  \r\nline two\n")
	);
	assert_eq!(
		reparsed.configs["nginx"].content.as_deref(),
		Some("server {\n  listen 80;\n}\n")
	);

	Ok(())
}
