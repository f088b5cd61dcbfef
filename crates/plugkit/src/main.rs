use plugkit_core::{Arguments, LoadState, Manager};

fn main() {
    env_logger::init();

    let mut args = Arguments::new();
    args.set_help("Inspects and exercises a directory of plugins.");
    args.add_argument("command");
    args.set_key_help("command", "one of list, load or unload");
    args.add_option_short('p', "plugin", "");
    args.set_key_help("plugin", "plugin name for load and unload");
    args.add_option_short('d', "plugin-dir", "plugins");
    args.set_key_help("plugin-dir", "directory to look for plugins in");
    args.add_option_short('i', "interface", "example.plugkit.Service/1.0");
    args.set_key_help("interface", "interface string the plugins must match");
    args.parse(std::env::args());

    let manager = Manager::new(args.value("interface"), args.value("plugin-dir"));

    match args.value("command") {
        "list" => {
            for name in manager.plugin_list() {
                let state = manager.load_state(&name);
                let depends = manager
                    .metadata(&name)
                    .map(|metadata| metadata.depends().join(", "))
                    .unwrap_or_default();
                if depends.is_empty() {
                    println!("{:<24} {}", name, state);
                } else {
                    println!("{:<24} {} (depends on {})", name, state, depends);
                }
            }
        }
        "load" => {
            let plugin = args.value("plugin");
            let state = manager.load(plugin);
            println!("{}: {}", plugin, state);
            if !state.matches(LoadState::Loaded | LoadState::Static) {
                std::process::exit(2);
            }
        }
        "unload" => {
            let plugin = args.value("plugin");
            let state = manager.unload(plugin);
            println!("{}: {}", plugin, state);
            if !state.matches(LoadState::NotLoaded | LoadState::Static) {
                std::process::exit(2);
            }
        }
        other => {
            eprintln!("unknown command '{}', expected list, load or unload", other);
            std::process::exit(1);
        }
    }
}
