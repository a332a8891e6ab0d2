use mw_config::GlobalConfig;

#[test]
fn default_config_has_no_p2p_seeds() {
	let config = GlobalConfig::default();
	assert!(config.p2p.seeds.is_empty());
	assert_eq!(config.p2p.port, 13414);
}

#[test]
fn load_missing_file_errors() {
	let result = GlobalConfig::load("./this-file-does-not-exist.toml");
	assert!(result.is_err());
}
