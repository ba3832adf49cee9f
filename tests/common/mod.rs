use once_cell::sync::Lazy;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

/// Stand in for gdb: answers the batch mode probes and runs a scripted machine interface session
/// with one breakpoint at /src/a.c:42.
const FAKE_GDB: &str = r#"#!/bin/sh
for arg in "$@"; do
    case "$arg" in -batch) batch=1 ;; esac
done
if [ -n "$batch" ]; then
    case "$*" in
        *"show version"*) echo "GNU gdb (GDB) 13.2" ;;
        *"complete set "*) printf 'set args\nset confirm\nset height\nset width\n' ;;
        *complete*) printf 'break\ncontinue\nshell\nshow\nstep\n' ;;
    esac
    exit 0
fi

echo '=thread-group-added,id="i1"'
printf '%s\n' '~"GNU gdb (GDB) 13.2\n"'
echo '(gdb) '
while read -r line; do
    token=${line%%[!0-9]*}
    cmd=${line#"$token"}
    case "$cmd" in
        -break-list)
            echo "${token}^done,BreakpointTable={nr_rows=\"1\",nr_cols=\"6\",body=[bkpt={number=\"1\",type=\"breakpoint\",enabled=\"y\",fullname=\"/src/a.c\",line=\"42\"}]}" ;;
        -stack-info-frame) echo "${token}^error,msg=\"No stack.\"" ;;
        -file-list-exec-source-file) echo "${token}^done,fullname=\"/src/a.c\",line=\"1\"" ;;
        quit) exit 0 ;;
        *"-interpreter-exec console"*)
            printf '%s\n' '~"ok\n"'
            echo "${token}^done" ;;
        *) echo "${token}^error,msg=\"unknown\"" ;;
    esac
    echo '(gdb) '
done
"#;

static FAKE_GDB_PATH: Lazy<PathBuf> = Lazy::new(|| {
    let path = std::env::temp_dir().join(format!("fake-gdb-{}.sh", uuid::Uuid::new_v4()));
    std::fs::write(&path, FAKE_GDB).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
});

/// Path of an executable fake gdb script.
pub fn fake_gdb() -> &'static str {
    FAKE_GDB_PATH.to_str().unwrap()
}
