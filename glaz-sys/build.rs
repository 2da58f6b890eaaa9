//! Links the vendor GlazLib when the `glaz-sdk` feature is enabled. Without
//! the feature the declarations in src/lib.rs compile and nothing is linked.

fn main() {
    #[cfg(feature = "glaz-sdk")]
    link::run();
}

#[cfg(feature = "glaz-sdk")]
mod link {
    use std::env;
    use std::path::PathBuf;

    const LIB_NAME: &str = "GlazLib";

    fn library_file() -> String {
        if cfg!(target_os = "windows") {
            format!("{LIB_NAME}.lib")
        } else {
            format!("lib{LIB_NAME}.so")
        }
    }

    /// Where the vendor package puts the library: its own `lib/<platform>`
    /// tree copied next to Cargo.toml, or the installer's system location.
    fn install_dirs() -> Vec<PathBuf> {
        let dirs: &[&str] = if cfg!(target_os = "windows") {
            if cfg!(target_pointer_width = "64") {
                &["lib/win64", "lib/win64-static", "C:/Program Files/Glaz/lib/win64"]
            } else {
                &["lib/win32", "lib/win32-static", "C:/Program Files/Glaz/lib/win32"]
            }
        } else {
            &["lib/linux64", "/opt/glaz/lib", "/usr/local/lib"]
        };
        dirs.iter().map(PathBuf::from).collect()
    }

    fn missing_library_help() -> String {
        let searched: Vec<String> = install_dirs()
            .iter()
            .map(|dir| format!("    {}", dir.display()))
            .collect();
        format!(
            "the `glaz-sdk` feature needs {file}, and GLAZ_LIB_DIR is not set.\n\
             Searched:\n{searched}\n\
             Set GLAZ_LIB_DIR to the directory holding {file}, e.g.\n    \
             export GLAZ_LIB_DIR=/path/to/glaz/lib/linux64",
            file = library_file(),
            searched = searched.join("\n"),
        )
    }

    pub fn run() {
        println!("cargo:rerun-if-env-changed=GLAZ_LIB_DIR");

        let lib_dir = match env::var_os("GLAZ_LIB_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let found = install_dirs()
                    .into_iter()
                    .find(|dir| dir.join(library_file()).is_file());
                match found {
                    Some(dir) => {
                        println!("cargo:warning=Using {LIB_NAME} from {}", dir.display());
                        dir
                    }
                    None => panic!("{}", missing_library_help()),
                }
            }
        };

        if !lib_dir.join(library_file()).is_file() {
            println!(
                "cargo:warning={} not in GLAZ_LIB_DIR={}; relying on the linker search path",
                library_file(),
                lib_dir.display()
            );
        }

        println!("cargo:rustc-link-search=native={}", lib_dir.display());
        println!("cargo:rustc-link-lib=dylib={LIB_NAME}");
    }
}
