use docker_compose_config::ComposeFile;
use indexmap::IndexMap;
use indoc::indoc;
use pretty_assertions::assert_eq;
use stackyard::{
	inspect::{InspectionRecord, PROJECT_LABEL, SERVICE_LABEL, ZERO_TIMESTAMP},
	reconcile::reconcile,
};

const BLOG: &str = indoc! {r#"
	services:
	  ghost:
	    image: ghost:5
	    container_name: blog
	    command: ["node", "current/index.js"]
	    environment:
	      url: https://blog.home.arpa
	      database__client: mysql
	    labels:
	      com.example.owner: me
	    ports:
	      - "2368:2368"
	    volumes:
	      - ghost-content:/var/lib/ghost/content
	      - ./themes:/var/lib/ghost/content/themes:ro
	    networks:
	      - backend
	  db:
	    image: mysql:8
	    restart: always
	    mem_limit: 1g
	    cpus: 0.5
	    environment:
	      - MYSQL_DATABASE=ghost
"#};

#[test]
fn undeployed_stacks_are_simulated() -> Result<(), Box<dyn std::error::Error>> {
	let doc = ComposeFile::from_yaml(BLOG)?;

	let declared = IndexMap::from([("blog".to_string(), doc.clone())]);

	let stacks = reconcile(&IndexMap::new(), &declared);

	assert_eq!(stacks.len(), 1);
	assert_eq!(stacks[0].name, "blog");
	assert_eq!(stacks[0].containers.len(), 2);

	for (record, (service_name, service)) in stacks[0].containers.iter().zip(&doc.services) {
		assert!(!record.state.running);
		assert_eq!(record.state.status, "created");
		assert_eq!(record.state.pid, 0);
		assert_eq!(record.state.started_at, ZERO_TIMESTAMP);
		assert_eq!(record.network_settings.ip_address, "");

		assert_eq!(Some(record.config.image.as_str()), service.image.as_deref());
		assert_eq!(record.config.env, service.env_entries());
		assert_eq!(record.project(), Some("blog"));
		assert_eq!(record.service(), Some(service_name.as_str()));

		for (key, value) in service.label_map() {
			assert_eq!(record.config.labels.get(&key), Some(&value));
		}
	}

	let ghost = &stacks[0].containers[0];

	assert_eq!(ghost.name, "/blog");
	assert_eq!(
		ghost.config.cmd,
		Some(vec!["node".to_string(), "current/index.js".to_string()])
	);
	assert_eq!(
		ghost.config.exposed_ports.keys().collect::<Vec<_>>(),
		vec!["2368/tcp"]
	);
	assert_eq!(
		ghost.host_config.port_bindings["2368/tcp"].as_ref().unwrap()[0].host_port,
		"2368"
	);
	assert_eq!(
		ghost.host_config.binds,
		Some(vec!["./themes:/var/lib/ghost/content/themes:ro".to_string()])
	);
	assert_eq!(
		ghost.mounts.iter().map(|m| m.kind.as_str()).collect::<Vec<_>>(),
		vec!["volume", "bind"]
	);
	assert!(!ghost.mounts[1].rw);
	assert_eq!(ghost.host_config.network_mode, "backend");
	assert_eq!(ghost.host_config.restart_policy.name, "no");

	let db = &stacks[0].containers[1];

	assert_eq!(db.name, "/db");
	assert_eq!(db.config.cmd, None);
	assert_eq!(db.host_config.network_mode, "default");
	assert_eq!(db.host_config.restart_policy.name, "always");
	assert_eq!(db.host_config.memory, 1 << 30);
	assert_eq!(db.host_config.nano_cpus, 500_000_000);

	Ok(())
}

#[test]
fn deployed_stacks_use_the_live_records() -> Result<(), Box<dyn std::error::Error>> {
	let running = InspectionRecord {
		id: "f00d".to_string(),
		name: "/blog".to_string(),
		..Default::default()
	};

	let live = IndexMap::from([("blog".to_string(), vec![running.clone()])]);
	let declared = IndexMap::from([
		("blog".to_string(), ComposeFile::from_yaml(BLOG)?),
		("wiki".to_string(), ComposeFile::from_yaml("services:\n  wiki:\n    image: wikijs\n")?),
	]);

	let stacks = reconcile(&live, &declared);

	assert_eq!(
		stacks.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
		vec!["blog", "wiki"]
	);
	assert_eq!(stacks[0].containers, vec![running]);
	assert_eq!(stacks[1].containers[0].config.labels[PROJECT_LABEL], "wiki");
	assert_eq!(stacks[1].containers[0].config.labels[SERVICE_LABEL], "wiki");

	Ok(())
}
