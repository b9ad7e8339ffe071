mod challenge_unit;
